// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{
    auth::{AuthRequest, AuthResponse, AuthenticationHandler, AuthenticationInfo, Extraction},
    resolver::Credentials,
};

use base64::{prelude::BASE64_STANDARD, Engine};
use http::{header, HeaderValue, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::{debug, warn};

/// Authentication type reported for HTTP Basic credentials.
pub const AUTH_TYPE_BASIC: &str = "BASIC";

/// How far HTTP Basic authentication goes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BasicMode {
    /// Accept credentials, and challenge clients for them.
    #[default]
    Enabled,

    /// Accept credentials, but only challenge clients no other handler can
    /// serve.
    Preemptive,

    /// Ignore HTTP Basic entirely.
    Disabled,
}

/// HTTP Basic authentication handler.
///
/// Always consulted after every registered handler.
#[derive(Debug, Clone)]
pub struct HttpBasicHandler {
    realm: String,
    mode: BasicMode,
}

impl HttpBasicHandler {
    pub fn new(realm: impl Into<String>, mode: BasicMode) -> Self {
        Self {
            realm: realm.into(),
            mode,
        }
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn mode(&self) -> BasicMode {
        self.mode
    }

    /// Check if HTTP Basic is on at all.
    pub fn is_available(&self) -> bool {
        self.mode != BasicMode::Disabled
    }

    /// Challenge client for HTTP Basic credentials.
    pub fn unauthorized(&self) -> AuthResponse {
        let mut response = Response::new(String::new());
        *response.status_mut() = StatusCode::UNAUTHORIZED;
        match HeaderValue::from_str(&format!("Basic realm=\"{}\"", self.realm)) {
            Ok(challenge) => {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, challenge);
            }
            Err(error) => warn!("cannot challenge with realm {:?}: {error}", self.realm),
        }
        response
    }
}

impl AuthenticationHandler for HttpBasicHandler {
    fn extract_credentials(&self, request: &AuthRequest) -> Extraction {
        if !self.is_available() {
            return Extraction::Nothing;
        }

        let Some(value) = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
        else {
            return Extraction::Nothing;
        };

        let Some((scheme, encoded)) = value.trim().split_once(' ') else {
            return Extraction::Nothing;
        };
        if !scheme.eq_ignore_ascii_case("basic") {
            return Extraction::Nothing;
        }

        let decoded = match BASE64_STANDARD.decode(encoded.trim()) {
            Ok(decoded) => decoded,
            Err(error) => {
                debug!("malformed basic credentials: {error}");
                return Extraction::Nothing;
            }
        };
        let decoded = String::from_utf8_lossy(&decoded);

        // INVARIANT: User names never contain a colon, passwords may.
        let (user, password) = decoded.split_once(':').unwrap_or((decoded.as_ref(), ""));
        Extraction::Credentials(AuthenticationInfo::new(
            AUTH_TYPE_BASIC,
            Credentials::new(user, password),
        ))
    }

    fn request_credentials(&self, _request: &AuthRequest) -> Option<AuthResponse> {
        (self.mode == BasicMode::Enabled).then(|| self.unauthorized())
    }
}

impl Display for HttpBasicHandler {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "HTTP Basic ({})", self.realm)
    }
}
