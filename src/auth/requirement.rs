// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::auth::{
    holder::{HolderPath, PathHolder},
    HandlerId,
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

/// Whether requests below a URL must be authenticated.
///
/// Written as `+/path` or plain `/path` to require authentication, and
/// as `-/path` to allow anonymous access. The URL may name protocol and
/// host too, e.g., `-https://example.com/public`.
///
/// Requirements opening up the login page of an authentication handler
/// belong to that handler. They never equal a configured requirement or
/// the login page requirement of another handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequirement {
    path: HolderPath,
    requires_auth: bool,
    owner: Option<HandlerId>,
}

impl AuthRequirement {
    pub fn new(url: impl Into<String>, requires_auth: bool) -> Self {
        Self {
            path: HolderPath::parse(url),
            requires_auth,
            owner: None,
        }
    }

    /// Allow anonymous access to login page of handler.
    pub fn login_page(url: impl Into<String>, owner: HandlerId) -> Self {
        Self {
            owner: Some(owner),
            ..Self::new(url, false)
        }
    }

    /// Parse requirement from its configuration form.
    pub fn from_config(config: &str) -> Self {
        let config = config.trim();
        match config.strip_prefix('-') {
            Some(url) => Self::new(url, false),
            None => Self::new(config.strip_prefix('+').unwrap_or(config), true),
        }
    }

    pub fn requires_auth(&self) -> bool {
        self.requires_auth
    }

    /// Authentication handler whose login page this is, if any.
    pub fn owner(&self) -> Option<HandlerId> {
        self.owner
    }
}

impl PathHolder for AuthRequirement {
    fn holder_path(&self) -> &HolderPath {
        &self.path
    }
}

impl FromStr for AuthRequirement {
    type Err = std::convert::Infallible;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_config(data))
    }
}

impl Display for AuthRequirement {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let sign = if self.requires_auth { '+' } else { '-' };
        write!(fmt, "{sign}{}", self.path)
    }
}
