// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Resource providers.
//!
//! A __resource provider__ is a pluggable backend that contributes resources
//! below one or more mount paths called __roots__. Providers are federated
//! into one uniform namespace through the [`ProviderTree`].
//!
//! # Registration
//!
//! Providers are registered as [`ProviderHandler`]s. A handler wraps the
//! provider with the information the tree needs to order it against other
//! providers mounted at the same root: a unique id, a ranking, and whether
//! the provider __owns its roots__. A provider owning its roots has the
//! final word on everything below them, i.e., providers mounted further up
//! the tree are never consulted for those paths.
//!
//! # See Also
//!
//! 1. [`memory`]
//! 2. [`fs`]
//!
//! [`ProviderTree`]: crate::tree::ProviderTree

pub mod fs;
pub mod memory;

use crate::resource::{Resource, ValueMap};

use std::{
    cmp::Ordering,
    fmt::{Debug, Formatter, Result as FmtResult},
    path::PathBuf,
    sync::Arc,
};
use tracing::debug;

/// Context handed to providers on every call.
///
/// Identifies who is asking, so providers can decide what to expose.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolveContext {
    user_id: Option<String>,
}

impl ResolveContext {
    /// Construct context for anonymous access.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Construct context for authenticated user.
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}

/// Backend contributing resources below its roots.
pub trait ResourceProvider: Send + Sync + 'static {
    /// Get resource at absolute path.
    ///
    /// Return `Ok(None)` if provider has nothing at path.
    fn get_resource(&self, ctx: &ResolveContext, path: &str) -> Result<Option<Resource>>;

    /// List direct children of parent resource.
    fn list_children(&self, ctx: &ResolveContext, parent: &Resource) -> Result<Vec<Resource>>;

    /// View provider as modifying provider, if it supports modification.
    fn as_modifying(&self) -> Option<&dyn ModifyingProvider> {
        None
    }
}

/// Resource provider that supports creation and deletion.
pub trait ModifyingProvider: Send + Sync {
    /// Check if resource can be created at path.
    fn can_create(&self, _ctx: &ResolveContext, _path: &str) -> bool {
        true
    }

    /// Check if resource can be deleted.
    fn can_delete(&self, _ctx: &ResolveContext, _resource: &Resource) -> bool {
        true
    }

    /// Create resource at path with given properties.
    fn create(&self, ctx: &ResolveContext, path: &str, properties: ValueMap) -> Result<Resource>;

    /// Delete resource at path along with everything below it.
    fn delete(&self, ctx: &ResolveContext, path: &str) -> Result<()>;
}

/// Unique identifier of a registered provider.
pub type ProviderId = u64;

/// Registered resource provider.
///
/// # Invariant
///
/// - Handlers order by ranking, highest first, then by id, lowest first.
/// - Two handlers are equal if and only if their ids are equal.
#[derive(Clone)]
pub struct ProviderHandler {
    id: ProviderId,
    name: String,
    roots: Vec<String>,
    ranking: i32,
    owns_roots: bool,
    provider: Arc<dyn ResourceProvider>,
}

impl ProviderHandler {
    /// Construct new provider handler.
    pub fn new(
        id: ProviderId,
        name: impl Into<String>,
        roots: impl IntoIterator<Item = impl Into<String>>,
        provider: Arc<dyn ResourceProvider>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            roots: roots.into_iter().map(Into::into).collect(),
            ranking: 0,
            owns_roots: false,
            provider,
        }
    }

    /// Set ranking of handler.
    pub fn with_ranking(mut self, ranking: i32) -> Self {
        self.ranking = ranking;
        self
    }

    /// Mark provider as owner of its roots.
    pub fn with_owns_roots(mut self, owns_roots: bool) -> Self {
        self.owns_roots = owns_roots;
        self
    }

    pub fn id(&self) -> ProviderId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn ranking(&self) -> i32 {
        self.ranking
    }

    pub fn owns_roots(&self) -> bool {
        self.owns_roots
    }

    pub fn provider(&self) -> &dyn ResourceProvider {
        self.provider.as_ref()
    }

    /// Get resource at path from wrapped provider.
    ///
    /// Stamps the resource with the name of this handler.
    pub fn get_resource(&self, ctx: &ResolveContext, path: &str) -> Result<Option<Resource>> {
        let resource = self.provider.get_resource(ctx, path)?.map(|mut resource| {
            resource.metadata_mut().provider = Some(self.name.clone());
            resource
        });
        debug!(
            "provider {} {} {path:?}",
            self.name,
            if resource.is_some() { "has" } else { "lacks" }
        );

        Ok(resource)
    }

    /// List children of parent from wrapped provider.
    pub fn list_children(&self, ctx: &ResolveContext, parent: &Resource) -> Result<Vec<Resource>> {
        let mut children = self.provider.list_children(ctx, parent)?;
        for child in children.iter_mut() {
            child.metadata_mut().provider = Some(self.name.clone());
        }

        Ok(children)
    }
}

impl Debug for ProviderHandler {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("ProviderHandler")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("roots", &self.roots)
            .field("ranking", &self.ranking)
            .field("owns_roots", &self.owns_roots)
            .finish()
    }
}

impl PartialEq for ProviderHandler {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ProviderHandler {}

impl PartialOrd for ProviderHandler {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ProviderHandler {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .ranking
            .cmp(&self.ranking)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Resource provider error types.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Resource cannot be created, because it already exists.
    #[error("resource already exists at {path:?}")]
    AlreadyExists { path: String },

    /// Resource cannot be modified, because it does not exist.
    #[error("no resource exists at {path:?}")]
    NotFound { path: String },

    /// Resource path is outside of provider's root.
    #[error("path {path:?} is outside of provider root {root:?}")]
    OutsideRoot { path: String, root: String },

    /// Backing file cannot be accessed.
    #[error("failed to access {:?}", file.display())]
    Io {
        #[source]
        source: std::io::Error,
        file: PathBuf,
    },

    /// Backing directory cannot be listed.
    #[error(transparent)]
    Walk(#[from] ignore::Error),
}

/// Friendly result alias :3
pub type Result<T, E = ProviderError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::memory::MemoryProvider;
    use pretty_assertions::assert_eq;

    fn handler(id: ProviderId, ranking: i32) -> ProviderHandler {
        ProviderHandler::new(id, format!("p{id}"), ["/"], Arc::new(MemoryProvider::new()))
            .with_ranking(ranking)
    }

    #[test]
    fn handler_ordering() {
        let mut handlers = vec![handler(3, 0), handler(1, 0), handler(2, 10), handler(4, -5)];
        handlers.sort();
        let result = handlers.iter().map(ProviderHandler::id).collect::<Vec<_>>();
        assert_eq!(result, vec![2, 1, 3, 4]);
    }

    #[test]
    fn handler_equality_by_id() {
        assert_eq!(handler(1, 0), handler(1, 99));
        assert_ne!(handler(1, 0), handler(2, 0));
    }

    #[test]
    fn handler_stamps_provider_name() -> anyhow::Result<()> {
        let provider = MemoryProvider::new();
        provider.insert(Resource::new("/a", "t"));
        let handler = ProviderHandler::new(7, "mem", ["/"], Arc::new(provider));
        let ctx = ResolveContext::anonymous();

        let resource = handler.get_resource(&ctx, "/a")?.expect("resource at /a");
        assert_eq!(resource.metadata().provider.as_deref(), Some("mem"));
        assert_eq!(handler.get_resource(&ctx, "/b")?, None);

        Ok(())
    }
}
