// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Children merge iteration.
//!
//! The children of a resource may come from many providers at once: the
//! provider mounted at the resource itself, providers mounted further up
//! the tree, and providers mounted below it whose mount paths imply
//! intermediate resources. [`Children`] merges all of them into one stream.
//!
//! # Phases
//!
//! 1. Providers are asked for children one at a time, deepest mount first.
//!    Concrete children are yielded right away. Synthetic children are held
//!    back.
//! 2. Tree nodes directly below the parent are asked for the resource they
//!    stand for. A hit is yielded, a miss becomes a held back synthetic
//!    resource.
//! 3. Held back synthetic resources are yielded in the order they were
//!    first seen.
//!
//! A concrete resource always beats a synthetic one at the same path, no
//! matter which arrives first, and no path is ever yielded twice.

use crate::{
    path,
    provider::{ProviderHandler, ResolveContext},
    resource::Resource,
    tree::{NodeId, ProviderTree, ROOT},
};

use indexmap::IndexMap;
use std::{collections::HashSet, iter::FusedIterator, sync::Arc, vec::IntoIter};
use tracing::{debug, warn};

/// Iterator over merged children of a resource.
pub struct Children {
    tree: Arc<ProviderTree>,
    ctx: ResolveContext,
    parent: Resource,
    prefix: String,
    providers: IntoIter<Arc<ProviderHandler>>,
    resources: IntoIter<Resource>,
    base_entries: Option<IntoIter<NodeId>>,
    delayed: IndexMap<String, Resource>,
    visited: HashSet<String>,
    flush: Option<indexmap::map::IntoValues<String, Resource>>,
}

impl Children {
    pub(crate) fn new(tree: Arc<ProviderTree>, ctx: ResolveContext, parent: Resource) -> Self {
        let elements = path::split(parent.path());
        let entries = tree.entries(&elements);

        // INVARIANT: Deepest node first, stop above a node owning its roots.
        let mut providers = Vec::new();
        let mut owned = false;
        for node in entries.iter().rev() {
            let handlers = &tree.node(*node).handlers;
            providers.extend(handlers.iter().cloned());
            if handlers.iter().any(|handler| handler.owns_roots()) {
                owned = true;
                break;
            }
        }
        if !owned {
            providers.extend(tree.node(ROOT).handlers.iter().cloned());
        }

        // INVARIANT: Child nodes only count if parent is itself a node.
        let base_entries = if elements.is_empty() {
            Some(tree.node(ROOT).children.values().copied().collect::<Vec<_>>())
        } else if entries.len() == elements.len() {
            entries
                .last()
                .map(|node| tree.node(*node).children.values().copied().collect())
        } else {
            None
        };

        let prefix = path::join(parent.path(), "");

        Self {
            tree,
            ctx,
            parent,
            prefix,
            providers: providers.into_iter(),
            resources: Vec::new().into_iter(),
            base_entries: base_entries.map(Vec::into_iter),
            delayed: IndexMap::new(),
            visited: HashSet::new(),
            flush: None,
        }
    }

    /// Pull next resource from current provider, moving on to the next
    /// provider when exhausted.
    fn next_provided(&mut self) -> Option<Resource> {
        loop {
            if let Some(resource) = self.resources.next() {
                return Some(resource);
            }

            let handler = self.providers.next()?;
            match handler.list_children(&self.ctx, &self.parent) {
                Ok(children) => {
                    debug!(
                        "provider {} lists {} children of {:?}",
                        handler.name(),
                        children.len(),
                        self.parent.path()
                    );
                    self.resources = children.into_iter();
                }
                Err(error) => {
                    warn!(
                        "provider {} failed to list children of {:?}: {error}",
                        handler.name(),
                        self.parent.path()
                    );
                }
            }
        }
    }

    /// Resolve next tree node below parent into a resource.
    fn next_base_entry(&mut self) -> Option<Resource> {
        let base_entries = self.base_entries.as_mut()?;
        for node in base_entries.by_ref() {
            let child_path = format!("{}{}", self.prefix, self.tree.node(node).segment);
            if self.visited.contains(&child_path) {
                continue;
            }

            match self.tree.get_resource(&self.ctx, &child_path, false) {
                Ok(Some(resource)) if !resource.is_synthetic() => return Some(resource),
                Ok(_) => {}
                Err(error) => warn!("failed to resolve {child_path:?}: {error}"),
            }
            self.delayed
                .entry(child_path.clone())
                .or_insert_with(|| Resource::synthetic(child_path));
        }
        self.base_entries = None;

        None
    }

    /// Accept concrete resource unless its path was already yielded.
    fn accept(&mut self, resource: Resource) -> Option<Resource> {
        if self.visited.contains(resource.path()) {
            return None;
        }

        if resource.is_synthetic() {
            self.delayed
                .entry(resource.path().to_owned())
                .or_insert(resource);
            return None;
        }

        // INVARIANT: Concrete resource overrides held back synthetic one.
        self.delayed.shift_remove(resource.path());
        self.visited.insert(resource.path().to_owned());
        Some(resource)
    }
}

impl Iterator for Children {
    type Item = Resource;

    fn next(&mut self) -> Option<Self::Item> {
        while self.flush.is_none() {
            if let Some(resource) = self.next_provided() {
                if let Some(resource) = self.accept(resource) {
                    return Some(resource);
                }
            } else if self.base_entries.is_some() {
                if let Some(resource) = self.next_base_entry() {
                    if let Some(resource) = self.accept(resource) {
                        return Some(resource);
                    }
                }
            } else {
                let delayed = std::mem::take(&mut self.delayed);
                self.flush = Some(delayed.into_values());
            }
        }

        self.flush.as_mut()?.next()
    }
}

impl FusedIterator for Children {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{memory::MemoryProvider, ProviderId, ResourceProvider};
    use pretty_assertions::assert_eq;

    fn handler(
        id: ProviderId,
        root: &str,
        resources: impl IntoIterator<Item = Resource>,
    ) -> Arc<ProviderHandler> {
        let provider: Arc<dyn ResourceProvider> = Arc::new(MemoryProvider::from_iter(resources));
        Arc::new(ProviderHandler::new(id, format!("p{id}"), [root], provider))
    }

    fn listing(tree: ProviderTree, parent: &str) -> Vec<(String, bool)> {
        let tree = Arc::new(tree);
        tree.children(&ResolveContext::anonymous(), &Resource::new(parent, "t"))
            .map(|child| (child.path().to_owned(), child.is_synthetic()))
            .collect()
    }

    #[test]
    fn concrete_beats_synthetic_at_same_path() {
        let mut tree = ProviderTree::new();
        tree.add(
            "/",
            handler(1, "/", [Resource::synthetic("/a"), Resource::new("/b", "t")]),
        );
        tree.add("/", handler(2, "/", [Resource::new("/a", "t"), Resource::new("/b", "t")]));

        let result = listing(tree, "/");
        assert_eq!(
            result,
            vec![("/b".to_owned(), false), ("/a".to_owned(), false)]
        );
    }

    #[test]
    fn mount_points_fill_in_synthetic_children() {
        let mut tree = ProviderTree::new();
        tree.add("/", handler(1, "/", [Resource::new("/content", "t")]));
        tree.add("/apps/site", handler(2, "/apps/site", []));
        tree.add("/libs", handler(3, "/libs", [Resource::new("/libs", "folder")]));

        let result = listing(tree, "/");
        assert_eq!(
            result,
            vec![
                ("/content".to_owned(), false),
                ("/libs".to_owned(), false),
                ("/apps".to_owned(), true),
            ]
        );
    }

    #[test]
    fn deepest_provider_listed_first() {
        let mut tree = ProviderTree::new();
        tree.add("/", handler(1, "/", [Resource::new("/apps/from-root", "t")]));
        tree.add("/apps", handler(2, "/apps", [Resource::new("/apps/from-apps", "t")]));

        let result = listing(tree, "/apps");
        assert_eq!(
            result,
            vec![
                ("/apps/from-apps".to_owned(), false),
                ("/apps/from-root".to_owned(), false),
            ]
        );
    }

    #[test]
    fn owning_provider_hides_ancestors() {
        let mut tree = ProviderTree::new();
        tree.add("/", handler(1, "/", [Resource::new("/apps/from-root", "t")]));
        let owner = ProviderHandler::new(
            2,
            "owner",
            ["/apps"],
            Arc::new(MemoryProvider::from_iter([Resource::new("/apps/own", "t")])),
        )
        .with_owns_roots(true);
        tree.add("/apps", Arc::new(owner));

        let result = listing(tree, "/apps");
        assert_eq!(result, vec![("/apps/own".to_owned(), false)]);
    }

    #[test]
    fn no_duplicates_across_phases() {
        let mut tree = ProviderTree::new();
        tree.add("/", handler(1, "/", [Resource::new("/apps", "t")]));
        tree.add("/apps", handler(2, "/apps", [Resource::new("/apps", "t")]));

        let result = listing(tree, "/");
        assert_eq!(result, vec![("/apps".to_owned(), false)]);
    }

    #[test]
    fn synthetic_from_provider_flushed_last_once() {
        let mut tree = ProviderTree::new();
        tree.add(
            "/",
            handler(1, "/", [Resource::synthetic("/x"), Resource::new("/y", "t")]),
        );
        tree.add("/", handler(2, "/", [Resource::synthetic("/x")]));

        let result = listing(tree, "/");
        assert_eq!(
            result,
            vec![("/y".to_owned(), false), ("/x".to_owned(), true)]
        );
    }

    #[test]
    fn unknown_parent_has_no_children() {
        let tree = ProviderTree::new();
        assert_eq!(listing(tree, "/nothing/here"), vec![]);
    }
}
