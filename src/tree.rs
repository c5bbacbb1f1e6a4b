// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Provider tree.
//!
//! The provider tree federates every registered resource provider into one
//! namespace. It is a trie keyed by path segments. Each node holds the
//! handlers of all providers mounted at the path the node represents.
//!
//! # Lookup
//!
//! To find the providers for a path like `/a/b/c/d`, the path is split into
//! segments and the trie is walked from the root, `a`, `b`, `c`, `d`, until a
//! segment has no node. The nodes visited along the way are the candidates,
//! and the deepest one is asked first. Within one node, handlers are asked
//! in their sorted order.
//!
//! # Storage
//!
//! Nodes live in an arena and refer to each other by index. The root node
//! always sits at index zero. Nodes are never removed, so a node created as
//! a stub on the way to some mount path remains after its provider is gone.
//! Such childless, handler-less nodes are harmless: they only ever produce
//! synthetic resources.
//!
//! # See Also
//!
//! 1. [`children`]

pub mod children;

use crate::{
    path,
    provider::{ProviderError, ProviderHandler, ProviderId, ResolveContext},
    resource::{Resource, ValueMap},
    tree::children::Children,
};

use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, instrument, warn};

/// Index of a node inside the tree arena.
pub(crate) type NodeId = usize;

pub(crate) const ROOT: NodeId = 0;

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) segment: String,
    pub(crate) children: BTreeMap<String, NodeId>,
    pub(crate) handlers: Vec<Arc<ProviderHandler>>,
}

impl Node {
    fn new(segment: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            children: BTreeMap::new(),
            handlers: Vec::new(),
        }
    }
}

/// Trie of resource provider handlers.
#[derive(Debug, Clone)]
pub struct ProviderTree {
    nodes: Vec<Node>,
}

impl Default for ProviderTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderTree {
    /// Construct new tree holding nothing but an empty root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new("")],
        }
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Add handler at root path.
    ///
    /// Creates stub nodes down the root path as needed. The handler list of
    /// the final node stays sorted and free of duplicates.
    ///
    /// Returns `true` if the handler list grew.
    #[instrument(skip(self, handler), fields(provider = handler.name()), level = "debug")]
    pub fn add(&mut self, root: &str, handler: Arc<ProviderHandler>) -> bool {
        let mut current = ROOT;
        for segment in path::split(root) {
            current = match self.nodes[current].children.get(segment) {
                Some(child) => *child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(Node::new(segment));
                    self.nodes[current]
                        .children
                        .insert(segment.to_owned(), child);
                    child
                }
            };
        }

        let handlers = &mut self.nodes[current].handlers;
        if handlers.iter().any(|existing| existing.id() == handler.id()) {
            return false;
        }

        debug!("adding provider at {root:?}");
        handlers.push(handler);
        handlers.sort();
        true
    }

    /// Remove handler with id from node exactly matching root path.
    ///
    /// Returns `true` if a handler was removed.
    #[instrument(skip(self), level = "debug")]
    pub fn remove(&mut self, root: &str, id: ProviderId) -> bool {
        let elements = path::split(root);
        let entries = self.entries(&elements);
        let target = match entries.last() {
            None if elements.is_empty() => Some(ROOT),
            Some(last) if entries.len() == elements.len() => Some(*last),
            _ => None,
        };

        let removed = target.is_some_and(|node| {
            let handlers = &mut self.nodes[node].handlers;
            let before = handlers.len();
            handlers.retain(|handler| handler.id() != id);
            handlers.len() < before
        });

        if !removed {
            warn!("unable to remove provider {id} at {root:?}, no matching entry found");
        }

        removed
    }

    /// Walk down the tree along path segments.
    ///
    /// Collects every node visited, excluding the root, until a segment has
    /// no matching node.
    pub(crate) fn entries(&self, elements: &[&str]) -> Vec<NodeId> {
        let mut entries = Vec::with_capacity(elements.len());
        let mut current = ROOT;
        for segment in elements {
            match self.nodes[current].children.get(*segment) {
                Some(child) => {
                    current = *child;
                    entries.push(current);
                }
                None => break,
            }
        }

        entries
    }

    /// Get resource at absolute path.
    ///
    /// When `is_resolve` is false, a path that names a stub node without any
    /// handlers produces a synthetic resource. Request resolution must not
    /// see such placeholders, so it passes `true`.
    ///
    /// # Errors
    ///
    /// - Return [`ProviderError`] if any consulted provider fails.
    #[instrument(skip(self, ctx), level = "debug")]
    pub fn get_resource(
        &self,
        ctx: &ResolveContext,
        full_path: &str,
        is_resolve: bool,
    ) -> Result<Option<Resource>> {
        if !full_path.starts_with('/') {
            debug!("not absolute {full_path:?}");
            return Ok(None);
        }

        let elements = path::split(full_path);
        let entries = self.entries(&elements);
        let mut fallback = None;

        for node in entries.iter().rev() {
            match self.resource_from_node(ctx, *node, full_path, &mut fallback)? {
                Lookup::Found(resource) => return Ok(Some(resource)),
                Lookup::Owned => return Ok(fallback),
                Lookup::Continue => continue,
            }
        }

        match self.resource_from_node(ctx, ROOT, full_path, &mut fallback)? {
            Lookup::Found(resource) => return Ok(Some(resource)),
            Lookup::Owned | Lookup::Continue => {}
        }

        if fallback.is_some() {
            debug!("using last found resource for {full_path:?}");
            return Ok(fallback);
        }

        // INVARIANT: Only a path naming a handler-less node is synthetic.
        if !is_resolve && !elements.is_empty() && entries.len() == elements.len() {
            if let Some(last) = entries.last() {
                if self.nodes[*last].handlers.is_empty() {
                    debug!("resolved synthetic {full_path:?}");
                    return Ok(Some(Resource::synthetic(full_path)));
                }
            }
        }

        debug!("resource null {full_path:?}");
        Ok(None)
    }

    fn resource_from_node(
        &self,
        ctx: &ResolveContext,
        node: NodeId,
        full_path: &str,
        fallback: &mut Option<Resource>,
    ) -> Result<Lookup> {
        for handler in &self.nodes[node].handlers {
            let mut found_fallback = false;
            if let Some(mut resource) = handler.get_resource(ctx, full_path)? {
                if !resource.metadata().continue_resolving() {
                    debug!("resolved {full_path:?} using {}", handler.name());
                    return Ok(Lookup::Found(resource));
                }

                debug!(
                    "resolved {full_path:?} using {}, continue resolving flag is set",
                    handler.name()
                );
                resource.metadata_mut().continue_resolving = false;
                *fallback = Some(resource);
                found_fallback = true;
            }

            if handler.owns_roots() && !found_fallback {
                return Ok(Lookup::Owned);
            }
        }

        Ok(Lookup::Continue)
    }

    /// Find handler of a modifying provider responsible for path.
    ///
    /// Walks from the deepest matching node upwards, stopping at the first
    /// handler owning its roots. The root node is consulted last.
    pub fn modifying_handler(&self, full_path: &str) -> Option<Arc<ProviderHandler>> {
        let elements = path::split(full_path);
        for node in self.entries(&elements).iter().rev() {
            for handler in &self.nodes[*node].handlers {
                if handler.provider().as_modifying().is_some() {
                    return Some(Arc::clone(handler));
                }

                if handler.owns_roots() {
                    return None;
                }
            }
        }

        self.nodes[ROOT]
            .handlers
            .iter()
            .find(|handler| handler.provider().as_modifying().is_some())
            .cloned()
    }

    /// Create resource at path through responsible modifying provider.
    ///
    /// # Errors
    ///
    /// - Return [`TreeError::Unsupported`] if no modifying provider accepts
    ///   the creation.
    /// - Return [`TreeError::Provider`] if the provider fails to create.
    #[instrument(skip(self, ctx, properties), level = "debug")]
    pub fn create(
        &self,
        ctx: &ResolveContext,
        full_path: &str,
        properties: ValueMap,
    ) -> Result<Resource, TreeError> {
        let unsupported = || TreeError::Unsupported {
            operation: "create",
            path: full_path.to_owned(),
        };
        let handler = self.modifying_handler(full_path).ok_or_else(unsupported)?;
        let modifier = handler.provider().as_modifying().ok_or_else(unsupported)?;
        if !modifier.can_create(ctx, full_path) {
            return Err(unsupported());
        }

        let mut resource = modifier.create(ctx, full_path, properties)?;
        resource.metadata_mut().provider = Some(handler.name().to_owned());

        Ok(resource)
    }

    /// Delete resource through responsible modifying provider.
    ///
    /// # Errors
    ///
    /// - Return [`TreeError::Unsupported`] if no modifying provider accepts
    ///   the deletion.
    /// - Return [`TreeError::Provider`] if the provider fails to delete.
    #[instrument(skip(self, ctx, resource), fields(path = resource.path()), level = "debug")]
    pub fn delete(&self, ctx: &ResolveContext, resource: &Resource) -> Result<(), TreeError> {
        let full_path = resource.path();
        let unsupported = || TreeError::Unsupported {
            operation: "delete",
            path: full_path.to_owned(),
        };
        let handler = self.modifying_handler(full_path).ok_or_else(unsupported)?;
        let modifier = handler.provider().as_modifying().ok_or_else(unsupported)?;
        if !modifier.can_delete(ctx, resource) {
            return Err(unsupported());
        }

        Ok(modifier.delete(ctx, full_path)?)
    }

    /// Iterate children of parent across every contributing provider.
    pub fn children(self: &Arc<Self>, ctx: &ResolveContext, parent: &Resource) -> Children {
        Children::new(Arc::clone(self), ctx.clone(), parent.clone())
    }

    /// List every mount path with the names of providers mounted there.
    ///
    /// Ordered by mount path.
    pub fn mounts(&self) -> Vec<(String, Vec<String>)> {
        let mut mounts = Vec::new();
        let mut stack = vec![(ROOT, String::from("/"))];
        while let Some((node, node_path)) = stack.pop() {
            let handlers = &self.nodes[node].handlers;
            if !handlers.is_empty() {
                let names = handlers.iter().map(|h| h.name().to_owned()).collect();
                mounts.push((node_path.clone(), names));
            }

            for (segment, child) in self.nodes[node].children.iter().rev() {
                stack.push((*child, path::join(&node_path, segment)));
            }
        }

        mounts
    }
}

enum Lookup {
    Found(Resource),
    Owned,
    Continue,
}

/// Provider tree error types.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// No provider supports modification at path.
    #[error("{operation} at {path:?} is not supported")]
    Unsupported {
        operation: &'static str,
        path: String,
    },

    /// Provider failed to carry out operation.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Friendly result alias :3
type Result<T, E = ProviderError> = std::result::Result<T, E>;
