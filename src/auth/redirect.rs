// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::auth::{
    redirect, request_path, AuthRequest, AuthResponse, AuthenticationHandler, Extraction,
    PARAM_RESOURCE,
};

use tracing::debug;

/// Sends browsers to a login page.
///
/// The login page gets the originally requested resource as its `resource`
/// query parameter, so it can send the browser back after login. Logging in
/// itself is up to the page.
#[derive(Debug, Clone)]
pub struct LoginRedirectHandler {
    login_page: String,
}

impl LoginRedirectHandler {
    pub fn new(login_page: impl Into<String>) -> Self {
        Self {
            login_page: login_page.into(),
        }
    }
}

impl AuthenticationHandler for LoginRedirectHandler {
    fn extract_credentials(&self, _request: &AuthRequest) -> Extraction {
        Extraction::Nothing
    }

    fn request_credentials(&self, request: &AuthRequest) -> Option<AuthResponse> {
        let path = request_path(request);
        if path == self.login_page {
            debug!("already at login page {path:?}");
            return None;
        }

        let resource = match request.uri().query() {
            Some(query) => format!("{path}?{query}"),
            None => path.to_owned(),
        };
        let target = format!(
            "{}?{PARAM_RESOURCE}={}",
            self.login_page,
            urlencoding::encode(&resource)
        );

        Some(redirect(&target))
    }

    fn login_path(&self) -> Option<&str> {
        Some(&self.login_page)
    }
}
