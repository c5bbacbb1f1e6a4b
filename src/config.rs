// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the configuration file that sets up the resource
//! tree, its accounts, and authentication. Parsing goes through [`FromStr`]
//! and printing through [`Display`]. File I/O is left to the caller to
//! figure out.
//!
//! # General Layout
//!
//! ```toml
//! [resolver]
//! search_paths = ["/apps", "/libs"]
//! max_sessions = 64
//!
//! [auth]
//! anonymous_allowed = false
//! realm = "Sling"
//! http_basic = "preemptive"
//! requirements = ["-/content/public"]
//! login_page = "/system/login"
//!
//! [script]
//! extensions = ["jsp", "html"]
//!
//! [[account]]
//! user = "admin"
//! password = "admin"
//!
//! [[provider]]
//! name = "apps"
//! kind = "fs"
//! root = "/apps"
//! source = "$HOME/site/apps"
//!
//! [[provider]]
//! name = "content"
//! kind = "memory"
//! root = "/content"
//!
//! [[provider.resource]]
//! path = "page"
//! type = "site/page"
//! properties = { title = "Hello" }
//! ```

use crate::{
    auth::{
        basic::{BasicMode, HttpBasicHandler},
        redirect::LoginRedirectHandler,
        requirement::AuthRequirement,
        Authenticator,
    },
    path,
    provider::{
        fs::FsProvider,
        memory::{MemoryProvider, DEFAULT_RESOURCE_TYPE},
        ResourceProvider,
    },
    resolver::{ProviderOptions, ResourceResolverFactory, DEFAULT_SEARCH_PATHS},
    resource::{Resource, ValueMap},
    script::{ScriptResolver, DEFAULT_SCRIPT_EXTENSIONS},
};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
    sync::Arc,
};
use tracing::{debug, info};

/// Realm of HTTP Basic challenges when none is configured.
pub const DEFAULT_REALM: &str = "Sling (Development)";

/// Complete configuration file.
#[derive(Default, Debug, PartialEq, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub resolver: ResolverSettings,

    #[serde(default)]
    pub auth: AuthSettings,

    #[serde(default)]
    pub script: ScriptSettings,

    /// Accounts that may log in.
    #[serde(default, rename = "account", skip_serializing_if = "Vec::is_empty")]
    pub accounts: Vec<Account>,

    /// Resource providers to mount.
    #[serde(default, rename = "provider", skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<ProviderConfig>,
}

/// Everything a configuration sets up.
#[derive(Debug)]
pub struct Slingshot {
    pub factory: ResourceResolverFactory,
    pub authenticator: Authenticator,
    pub scripts: ScriptResolver,
}

impl Config {
    /// Instantiate resolver factory, authenticator, and script resolver.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::MissingSource`] if a file system provider
    ///   names no source directory.
    /// - Return [`ConfigError::RelativeRoot`] if a provider root is not
    ///   absolute.
    pub fn build(&self) -> Result<Slingshot> {
        let mut builder = ResourceResolverFactory::builder();
        for search_path in &self.resolver.search_paths {
            builder = builder.search_path(search_path);
        }
        for account in &self.accounts {
            builder = builder.account(&account.user, &account.password);
        }
        if let Some(max_sessions) = self.resolver.max_sessions {
            builder = builder.max_sessions(max_sessions);
        }
        let factory = builder.build();

        for provider in &self.providers {
            if !provider.root.starts_with('/') {
                return Err(ConfigError::RelativeRoot {
                    name: provider.name.clone(),
                    root: provider.root.clone(),
                });
            }

            let instance = provider.instantiate()?;
            let options = ProviderOptions {
                ranking: provider.ranking,
                owns_roots: provider.owns_roots,
            };
            factory.register(&provider.name, [provider.root.as_str()], instance, options);
        }

        let basic = HttpBasicHandler::new(&self.auth.realm, self.auth.http_basic);
        let authenticator =
            Authenticator::new(factory.clone(), basic, self.auth.anonymous_allowed);
        for requirement in &self.auth.requirements {
            authenticator.add_requirement(AuthRequirement::from_config(requirement));
        }
        if let Some(login_page) = &self.auth.login_page {
            authenticator.register_handler(
                "/",
                "login page",
                Arc::new(LoginRedirectHandler::new(login_page)),
            );
        }

        let scripts = ScriptResolver::new(&self.script.extensions);
        info!("configured {} providers", self.providers.len());

        Ok(Slingshot {
            factory,
            authenticator,
            scripts,
        })
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: Config = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on provider sources.
        for provider in &mut config.providers {
            if let Some(source) = &provider.source {
                let expanded = shellexpand::full(source.to_string_lossy().as_ref())
                    .map_err(ConfigError::ShellExpansion)?
                    .into_owned();
                provider.source = Some(PathBuf::from(expanded));
            }
        }

        Ok(config)
    }
}

impl Display for Config {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Resource resolution settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// Roots that relative paths and resource types resolve against.
    pub search_paths: Vec<String>,

    /// Limit of resolvers open at the same time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_sessions: Option<usize>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            search_paths: DEFAULT_SEARCH_PATHS.iter().map(|s| s.to_string()).collect(),
            max_sessions: None,
        }
    }
}

/// Authentication settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Serve requests without credentials anonymously.
    pub anonymous_allowed: bool,

    /// Realm of HTTP Basic challenges.
    pub realm: String,

    pub http_basic: BasicMode,

    /// Authentication requirements, e.g., `+/content` or `-/public`.
    pub requirements: Vec<String>,

    /// Login page browsers are sent to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_page: Option<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            anonymous_allowed: true,
            realm: DEFAULT_REALM.into(),
            http_basic: BasicMode::default(),
            requirements: Vec::new(),
            login_page: None,
        }
    }
}

/// Script resolution settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScriptSettings {
    /// File extensions marking scripts.
    pub extensions: Vec<String>,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_SCRIPT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Account that may log in.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Account {
    pub user: String,
    pub password: String,
}

/// Kind of resource provider.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Directory on disk.
    Fs,

    /// Resources declared inline.
    #[default]
    Memory,
}

/// Resource provider mounted at a root.
#[derive(Default, Debug, PartialEq, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    pub name: String,

    #[serde(default)]
    pub kind: ProviderKind,

    /// Absolute mount path.
    pub root: String,

    /// Directory backing a file system provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,

    /// Higher ranking providers are asked first.
    #[serde(default)]
    pub ranking: i32,

    /// Hide children of ancestor providers below root.
    #[serde(default)]
    pub owns_roots: bool,

    /// Resources of a memory provider.
    #[serde(default, rename = "resource", skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceConfig>,
}

impl ProviderConfig {
    fn instantiate(&self) -> Result<Arc<dyn ResourceProvider>> {
        match self.kind {
            ProviderKind::Fs => {
                let source = self.source.clone().ok_or_else(|| ConfigError::MissingSource {
                    name: self.name.clone(),
                })?;
                debug!("mounting {source:?} at {}", self.root);
                Ok(Arc::new(FsProvider::new(&self.root, source)))
            }
            ProviderKind::Memory => {
                let provider = self
                    .resources
                    .iter()
                    .map(|resource| resource.to_resource(&self.root))
                    .collect::<MemoryProvider>();
                debug!("holding {} resources at {}", provider.len(), self.root);
                Ok(Arc::new(provider))
            }
        }
    }
}

/// Resource declared inline.
#[derive(Default, Debug, PartialEq, Clone, Deserialize, Serialize)]
pub struct ResourceConfig {
    /// Absolute path, or path relative to provider root.
    pub path: String,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_type: Option<String>,

    #[serde(default, skip_serializing_if = "ValueMap::is_empty")]
    pub properties: ValueMap,
}

impl ResourceConfig {
    fn to_resource(&self, root: &str) -> Resource {
        let resource_path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            path::join(root, &self.path)
        };
        let resource_type = self.resource_type.as_deref().unwrap_or(DEFAULT_RESOURCE_TYPE);

        let resource = Resource::new(resource_path, resource_type)
            .with_properties(self.properties.clone());
        match &self.super_type {
            Some(super_type) => resource.with_super_type(super_type),
            None => resource,
        }
    }
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// File system provider without source directory.
    #[error("file system provider {name} needs a source directory")]
    MissingSource { name: String },

    /// Provider mounted at relative path.
    #[error("provider {name} has relative root {root:?}")]
    RelativeRoot { name: String, root: String },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
