// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Resource resolution.
//!
//! The [`ResourceResolverFactory`] owns the provider tree and the set of
//! known accounts. Logging in against the factory yields a
//! [`ResourceResolver`], the per-request view of the resource tree.
//!
//! # Registration
//!
//! Providers may be registered and unregistered at any time, even while
//! resolvers are busy looking things up. Writers serialize on a lock, copy
//! the current tree, modify the copy, and publish it as a new snapshot.
//! Readers simply load whatever snapshot is current and never wait.
//!
//! # Sessions
//!
//! Every open resolver holds one session slot. A factory may limit the
//! number of slots, in which case logging in fails once all slots are
//! taken. Closing or dropping a resolver frees its slot.

use crate::{
    path::{self, ResourcePaths},
    provider::{ProviderError, ProviderHandler, ProviderId, ResolveContext, ResourceProvider},
    resource::{Resource, ValueMap},
    tree::{children::Children, ProviderTree, TreeError},
};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tracing::{debug, info, instrument, warn};

/// Search paths used when none are configured.
pub const DEFAULT_SEARCH_PATHS: [&str; 2] = ["/apps", "/libs"];

/// User name and password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user_id: String,
    password: String,
}

impl Credentials {
    pub fn new(user_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            password: password.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl Debug for Credentials {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("password", &"<hidden>")
            .finish()
    }
}

/// Extra settings of a provider registration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProviderOptions {
    /// Ranking against other providers at the same root, highest first.
    pub ranking: i32,

    /// Provider has the final word on everything below its roots.
    pub owns_roots: bool,
}

/// Builder of [`ResourceResolverFactory`].
#[derive(Debug, Default, Clone)]
pub struct FactoryBuilder {
    search_paths: Vec<String>,
    accounts: HashMap<String, String>,
    max_sessions: Option<usize>,
}

impl FactoryBuilder {
    /// Append search path.
    pub fn search_path(mut self, search_path: impl Into<String>) -> Self {
        let search_path = search_path.into();
        let search_path = match search_path.trim_end_matches('/') {
            "" => "/".to_owned(),
            trimmed => trimmed.to_owned(),
        };
        self.search_paths.push(search_path);
        self
    }

    /// Add account that may log in.
    pub fn account(mut self, user_id: impl Into<String>, password: impl Into<String>) -> Self {
        self.accounts.insert(user_id.into(), password.into());
        self
    }

    /// Limit number of resolvers open at the same time.
    pub fn max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = Some(max_sessions);
        self
    }

    pub fn build(self) -> ResourceResolverFactory {
        let search_paths = if self.search_paths.is_empty() {
            DEFAULT_SEARCH_PATHS.iter().map(|s| s.to_string()).collect()
        } else {
            self.search_paths
        };

        ResourceResolverFactory {
            inner: Arc::new(FactoryInner {
                tree: ArcSwap::from_pointee(ProviderTree::new()),
                registry: Mutex::new(Registry::default()),
                search_paths,
                accounts: self.accounts,
                max_sessions: self.max_sessions,
                sessions: AtomicUsize::new(0),
            }),
        }
    }
}

#[derive(Debug, Default)]
struct Registry {
    next_id: ProviderId,
    handlers: BTreeMap<ProviderId, Arc<ProviderHandler>>,
}

struct FactoryInner {
    tree: ArcSwap<ProviderTree>,
    registry: Mutex<Registry>,
    search_paths: Vec<String>,
    accounts: HashMap<String, String>,
    max_sessions: Option<usize>,
    sessions: AtomicUsize,
}

/// Source of resource resolvers.
#[derive(Clone)]
pub struct ResourceResolverFactory {
    inner: Arc<FactoryInner>,
}

impl Default for ResourceResolverFactory {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ResourceResolverFactory {
    pub fn builder() -> FactoryBuilder {
        FactoryBuilder::default()
    }

    /// Register provider at its roots.
    ///
    /// Returns id of the new registration, needed to unregister it later.
    #[instrument(skip(self, roots, provider, options), level = "debug")]
    pub fn register(
        &self,
        name: &str,
        roots: impl IntoIterator<Item = impl Into<String>>,
        provider: Arc<dyn ResourceProvider>,
        options: ProviderOptions,
    ) -> ProviderId {
        let mut registry = self.inner.registry.lock();
        registry.next_id += 1;
        let id = registry.next_id;

        let handler = ProviderHandler::new(id, name, roots, provider)
            .with_ranking(options.ranking)
            .with_owns_roots(options.owns_roots);
        let handler = Arc::new(handler);

        let mut tree = ProviderTree::clone(&self.inner.tree.load());
        for root in handler.roots() {
            if !root.starts_with('/') {
                warn!("provider {name} has relative root {root:?}, ignoring it");
                continue;
            }
            tree.add(root, Arc::clone(&handler));
        }
        self.inner.tree.store(Arc::new(tree));
        info!("registered provider {name} at {:?}", handler.roots());
        registry.handlers.insert(id, handler);

        id
    }

    /// Unregister provider by id.
    ///
    /// Returns `false` if no provider is registered under the id.
    #[instrument(skip(self), level = "debug")]
    pub fn unregister(&self, id: ProviderId) -> bool {
        let mut registry = self.inner.registry.lock();
        let Some(handler) = registry.handlers.remove(&id) else {
            warn!("no provider registered with id {id}");
            return false;
        };

        let mut tree = ProviderTree::clone(&self.inner.tree.load());
        for root in handler.roots() {
            tree.remove(root, id);
        }
        self.inner.tree.store(Arc::new(tree));
        info!("unregistered provider {}", handler.name());

        true
    }

    /// Log in with credentials.
    ///
    /// # Errors
    ///
    /// - Return [`LoginError::UnknownUser`] if no account exists for user.
    /// - Return [`LoginError::BadPassword`] if password does not match.
    /// - Return [`LoginError::TooManySessions`] if all session slots are
    ///   taken.
    #[instrument(skip(self, credentials), fields(user = credentials.user_id()), level = "debug")]
    pub fn resolver(&self, credentials: &Credentials) -> Result<ResourceResolver, LoginError> {
        let user = credentials.user_id();
        match self.inner.accounts.get(user) {
            None => Err(LoginError::UnknownUser { user: user.into() }),
            Some(password) if password != credentials.password() => {
                Err(LoginError::BadPassword { user: user.into() })
            }
            Some(_) => self.open(ResolveContext::for_user(user)),
        }
    }

    /// Log in anonymously.
    ///
    /// # Errors
    ///
    /// - Return [`LoginError::TooManySessions`] if all session slots are
    ///   taken.
    pub fn anonymous_resolver(&self) -> Result<ResourceResolver, LoginError> {
        self.open(ResolveContext::anonymous())
    }

    fn open(&self, ctx: ResolveContext) -> Result<ResourceResolver, LoginError> {
        let session = Session::acquire(Arc::clone(&self.inner))?;
        debug!("opened resolver for {:?}", ctx.user_id());

        Ok(ResourceResolver {
            inner: Arc::clone(&self.inner),
            ctx,
            session: Some(session),
        })
    }

    pub fn search_paths(&self) -> &[String] {
        &self.inner.search_paths
    }

    /// Every mount path along with names of providers mounted there.
    pub fn mounts(&self) -> Vec<(String, Vec<String>)> {
        self.inner.tree.load().mounts()
    }

    /// Number of resolvers currently open.
    pub fn open_sessions(&self) -> usize {
        self.inner.sessions.load(Ordering::SeqCst)
    }
}

impl Debug for ResourceResolverFactory {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("ResourceResolverFactory")
            .field("search_paths", &self.inner.search_paths)
            .field("max_sessions", &self.inner.max_sessions)
            .field("sessions", &self.inner.sessions)
            .finish_non_exhaustive()
    }
}

/// Session slot held by an open resolver.
struct Session {
    inner: Arc<FactoryInner>,
}

impl Session {
    fn acquire(inner: Arc<FactoryInner>) -> Result<Self, LoginError> {
        let limit = inner.max_sessions;
        inner
            .sessions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |open| match limit {
                Some(max) if open >= max => None,
                _ => Some(open + 1),
            })
            .map_err(|open| LoginError::TooManySessions { open })?;

        Ok(Self { inner })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.inner.sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Per-request view of the resource tree.
pub struct ResourceResolver {
    inner: Arc<FactoryInner>,
    ctx: ResolveContext,
    session: Option<Session>,
}

impl ResourceResolver {
    fn tree(&self) -> Result<Arc<ProviderTree>> {
        if self.session.is_none() {
            return Err(ResolverError::Closed);
        }

        Ok(self.inner.tree.load_full())
    }

    /// Get resource at path.
    ///
    /// Absolute paths are looked up directly. Relative paths are tried
    /// against every search path in order, first hit wins.
    ///
    /// # Errors
    ///
    /// - Return [`ResolverError::Closed`] if resolver is closed.
    /// - Return [`ResolverError::Provider`] if a provider fails.
    pub fn get_resource(&self, path: &str) -> Result<Option<Resource>> {
        let tree = self.tree()?;
        if path.starts_with('/') {
            let Some(path) = path::normalize(path) else {
                return Ok(None);
            };
            return Ok(tree.get_resource(&self.ctx, &path, false)?);
        }

        for search_path in &self.inner.search_paths {
            let Some(candidate) = path::normalize(&path::join(search_path, path)) else {
                continue;
            };
            if let Some(resource) = tree.get_resource(&self.ctx, &candidate, false)? {
                return Ok(Some(resource));
            }
        }

        Ok(None)
    }

    /// Resolve request path to a resource.
    ///
    /// Candidate paths are tried from most to least specific. The part of
    /// the request path past the matching candidate becomes the resolution
    /// path info of the resource. Failing that, the path is walked down from
    /// the root, where a segment may also name a child by its `sling:alias`.
    /// If nothing matches, a non-existing resource is returned for the
    /// request path.
    ///
    /// # Errors
    ///
    /// - Return [`ResolverError::Closed`] if resolver is closed.
    /// - Return [`ResolverError::Provider`] if a provider fails.
    #[instrument(skip(self), level = "debug")]
    pub fn resolve(&self, path: &str) -> Result<Resource> {
        let tree = self.tree()?;
        let absolute = if path.starts_with('/') {
            path.to_owned()
        } else {
            format!("/{path}")
        };

        let Some(absolute) = path::normalize(&absolute) else {
            debug!("path {path:?} climbs above root");
            return Ok(Resource::non_existing(path));
        };

        if absolute == "/" {
            if let Some(resource) = tree.get_resource(&self.ctx, "/", true)? {
                return Ok(resource);
            }
        }

        if let Some(resource) = self.resolve_absolute(&tree, &absolute)? {
            return Ok(resource);
        }

        debug!("nothing at {absolute:?}, using non-existing resource");
        Ok(Resource::non_existing(absolute))
    }

    fn resolve_absolute(&self, tree: &Arc<ProviderTree>, absolute: &str) -> Result<Option<Resource>> {
        for candidate in ResourcePaths::new(absolute) {
            if let Some(mut resource) = tree.get_resource(&self.ctx, &candidate, true)? {
                let metadata = resource.metadata_mut();
                metadata.resolution_path_info = absolute[candidate.len()..].to_owned();
                metadata.resolution_path = candidate;
                debug!("resolved {absolute:?} to {:?}", resource.path());
                return Ok(Some(resource));
            }
        }

        self.resolve_aliased(tree, absolute)
    }

    /// Drill down from the root, matching each segment by name or alias.
    ///
    /// The first segment that matches nothing is retried with its
    /// extensions cut off, and a hit there ends the walk.
    fn resolve_aliased(&self, tree: &Arc<ProviderTree>, absolute: &str) -> Result<Option<Resource>> {
        let mut current = match tree.get_resource(&self.ctx, "/", true)? {
            Some(root) => root,
            None => Resource::synthetic("/"),
        };
        let mut resolution_path = String::new();

        for segment in path::split(absolute) {
            if let Some(child) = self.child_or_alias(tree, &current, segment)? {
                current = child;
                resolution_path = path::join(&resolution_path, segment);
                continue;
            }

            let mut found = None;
            for name in ResourcePaths::new(segment).skip(1) {
                if let Some(child) = self.child_or_alias(tree, &current, &name)? {
                    resolution_path = path::join(&resolution_path, &name);
                    found = Some(child);
                    break;
                }
            }

            match found {
                Some(child) => {
                    current = child;
                    break;
                }
                None => return Ok(None),
            }
        }

        if current.is_synthetic() || resolution_path.is_empty() {
            return Ok(None);
        }

        debug!("resolved {absolute:?} to {:?} through aliases", current.path());
        let metadata = current.metadata_mut();
        metadata.resolution_path_info = absolute[resolution_path.len()..].to_owned();
        metadata.resolution_path = resolution_path;

        Ok(Some(current))
    }

    fn child_or_alias(
        &self,
        tree: &Arc<ProviderTree>,
        parent: &Resource,
        name: &str,
    ) -> Result<Option<Resource>> {
        let child_path = path::join(parent.path(), name);
        if let Some(child) = tree.get_resource(&self.ctx, &child_path, true)? {
            return Ok(Some(child));
        }

        let aliased = tree
            .children(&self.ctx, parent)
            .find(|child| child.aliases().contains(&name));
        match aliased {
            Some(child) => {
                debug!("alias {name:?} names {:?}", child.path());
                Ok(tree.get_resource(&self.ctx, child.path(), true)?)
            }
            None => Ok(None),
        }
    }

    /// Map resource path back to the path a request would use.
    ///
    /// Resolves the path, then replaces every segment of the resolved
    /// resource path by the first alias of the resource at that segment.
    /// Anything the resolution cut off is appended again, as is a query or
    /// fragment of the input. Paths that resolve to nothing come back
    /// unchanged.
    ///
    /// # Errors
    ///
    /// - Return [`ResolverError::Closed`] if resolver is closed.
    /// - Return [`ResolverError::Provider`] if a provider fails.
    #[instrument(skip(self), level = "debug")]
    pub fn map(&self, resource_path: &str) -> Result<String> {
        let tree = self.tree()?;
        let (path_part, tail) = match resource_path.find(['#', '?']) {
            Some(idx) => resource_path.split_at(idx),
            None => (resource_path, ""),
        };

        let resolved = match path::normalize(path_part) {
            Some(absolute) if absolute.starts_with('/') => self.resolve_absolute(&tree, &absolute)?,
            _ => None,
        };
        let Some(resource) = resolved else {
            debug!("nothing to map at {resource_path:?}");
            return Ok(resource_path.to_owned());
        };

        let mut names = Vec::new();
        let mut current = Some(resource.clone());
        let mut current_path = resource.path().to_owned();
        while current_path != "/" {
            let alias = current
                .as_ref()
                .and_then(|current| current.aliases().first().map(|alias| alias.to_string()));
            names.push(alias.unwrap_or_else(|| path::name(&current_path).to_owned()));

            let Some(parent) = path::parent(&current_path) else {
                break;
            };
            current_path = parent.to_owned();
            current = tree.get_resource(&self.ctx, &current_path, true)?;
        }

        let mut mapped = names
            .iter()
            .rev()
            .fold(String::new(), |mapped, name| format!("{mapped}/{name}"));
        if mapped.is_empty() {
            mapped.push('/');
        }
        mapped.push_str(&resource.metadata().resolution_path_info);
        mapped.push_str(tail);
        debug!("mapped {resource_path:?} to {mapped:?}");

        Ok(mapped)
    }

    /// Iterate children of parent across every contributing provider.
    ///
    /// # Errors
    ///
    /// - Return [`ResolverError::Closed`] if resolver is closed.
    pub fn list_children(&self, parent: &Resource) -> Result<Children> {
        Ok(self.tree()?.children(&self.ctx, parent))
    }

    /// Get parent of resource.
    ///
    /// # Errors
    ///
    /// - Return [`ResolverError::Closed`] if resolver is closed.
    /// - Return [`ResolverError::Provider`] if a provider fails.
    pub fn parent(&self, resource: &Resource) -> Result<Option<Resource>> {
        match resource.parent_path() {
            Some(parent) => self.get_resource(parent),
            None => {
                self.tree()?;
                Ok(None)
            }
        }
    }

    /// Create child resource of parent.
    ///
    /// # Errors
    ///
    /// - Return [`ResolverError::Closed`] if resolver is closed.
    /// - Return [`ResolverError::Tree`] if no provider can create the
    ///   resource.
    pub fn create(&self, parent: &Resource, name: &str, properties: ValueMap) -> Result<Resource> {
        let tree = self.tree()?;
        let path = path::join(parent.path(), name);
        Ok(tree.create(&self.ctx, &path, properties)?)
    }

    /// Delete resource along with everything below it.
    ///
    /// # Errors
    ///
    /// - Return [`ResolverError::Closed`] if resolver is closed.
    /// - Return [`ResolverError::Tree`] if no provider can delete the
    ///   resource.
    pub fn delete(&self, resource: &Resource) -> Result<()> {
        let tree = self.tree()?;
        Ok(tree.delete(&self.ctx, resource)?)
    }

    /// Super type of resource.
    ///
    /// A super type set on the resource itself wins. Otherwise the super
    /// type of its resource type is looked up.
    ///
    /// # Errors
    ///
    /// - Return [`ResolverError::Closed`] if resolver is closed.
    /// - Return [`ResolverError::Provider`] if a provider fails.
    pub fn parent_resource_type(&self, resource: &Resource) -> Result<Option<String>> {
        match resource.super_type() {
            Some(super_type) => {
                self.tree()?;
                Ok(Some(super_type.to_owned()))
            }
            None => self.parent_resource_type_of(resource.resource_type()),
        }
    }

    /// Super type of resource type.
    ///
    /// Read from the resource the type names, which is found like any
    /// other relative path through the search paths.
    ///
    /// # Errors
    ///
    /// - Return [`ResolverError::Closed`] if resolver is closed.
    /// - Return [`ResolverError::Provider`] if a provider fails.
    pub fn parent_resource_type_of(&self, resource_type: &str) -> Result<Option<String>> {
        let type_path = path::resource_type_to_path(resource_type);
        let super_type = self
            .get_resource(&type_path)?
            .and_then(|type_resource| type_resource.super_type().map(ToOwned::to_owned));

        Ok(super_type)
    }

    /// Check if resource is of resource type, directly or through its super
    /// types.
    ///
    /// Types are compared in path form. The super type chain ends at the
    /// first type seen twice.
    ///
    /// # Errors
    ///
    /// - Return [`ResolverError::Closed`] if resolver is closed.
    /// - Return [`ResolverError::Provider`] if a provider fails.
    pub fn is_resource_type(&self, resource: &Resource, resource_type: &str) -> Result<bool> {
        self.tree()?;
        let wanted = path::resource_type_to_path(resource_type);
        let mut current = path::resource_type_to_path(resource.resource_type());
        if current == wanted {
            return Ok(true);
        }

        let mut visited = HashSet::from([current]);
        let mut super_type = self.parent_resource_type(resource)?;
        while let Some(next) = super_type {
            current = path::resource_type_to_path(&next);
            if current == wanted {
                return Ok(true);
            }
            if !visited.insert(current) {
                debug!("super type cycle at {next:?}");
                break;
            }
            super_type = self.parent_resource_type_of(&next)?;
        }

        Ok(false)
    }

    /// Id of user this resolver was opened for, if not anonymous.
    ///
    /// # Errors
    ///
    /// - Return [`ResolverError::Closed`] if resolver is closed.
    pub fn user_id(&self) -> Result<Option<&str>> {
        self.tree()?;
        Ok(self.ctx.user_id())
    }

    /// # Errors
    ///
    /// - Return [`ResolverError::Closed`] if resolver is closed.
    pub fn search_paths(&self) -> Result<&[String]> {
        self.tree()?;
        Ok(&self.inner.search_paths)
    }

    /// Close resolver, releasing its session slot.
    ///
    /// Closing twice is harmless.
    pub fn close(&mut self) {
        if self.session.take().is_some() {
            debug!("closed resolver for {:?}", self.ctx.user_id());
        }
    }

    pub fn is_live(&self) -> bool {
        self.session.is_some()
    }
}

impl Debug for ResourceResolver {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("ResourceResolver")
            .field("user_id", &self.ctx.user_id())
            .field("live", &self.is_live())
            .finish()
    }
}

/// Login error types.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    /// No account exists for user.
    #[error("unknown user {user:?}")]
    UnknownUser { user: String },

    /// Password does not match account.
    #[error("wrong password for user {user:?}")]
    BadPassword { user: String },

    /// All session slots are taken.
    #[error("too many open sessions ({open})")]
    TooManySessions { open: usize },
}

/// Resource resolver error types.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    /// Resolver was used after being closed.
    #[error("resource resolver is already closed")]
    Closed,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Friendly result alias :3
pub type Result<T, E = ResolverError> = std::result::Result<T, E>;
