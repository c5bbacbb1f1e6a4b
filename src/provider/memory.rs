// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! In-memory resource provider.
//!
//! Keeps resources in an ordered map keyed by absolute path. Useful for
//! content declared inline in the configuration file, and as a modifiable
//! scratch area.

use crate::{
    path,
    provider::{ModifyingProvider, ProviderError, ResolveContext, ResourceProvider, Result},
    resource::{Resource, Value, ValueMap},
};

use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Property naming the resource type of created resources.
pub const PROPERTY_RESOURCE_TYPE: &str = "sling:resourceType";

/// Resource type used when created resources name none.
pub const DEFAULT_RESOURCE_TYPE: &str = "nt:unstructured";

/// Resource provider backed by memory.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    resources: RwLock<BTreeMap<String, Resource>>,
}

impl MemoryProvider {
    /// Construct new empty memory provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert resource, replacing any resource at the same path.
    pub fn insert(&self, resource: Resource) {
        self.resources
            .write()
            .insert(resource.path().to_owned(), resource);
    }

    /// Number of resources held.
    pub fn len(&self) -> usize {
        self.resources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.read().is_empty()
    }
}

impl FromIterator<Resource> for MemoryProvider {
    fn from_iter<I: IntoIterator<Item = Resource>>(iter: I) -> Self {
        let resources = iter
            .into_iter()
            .map(|resource| (resource.path().to_owned(), resource))
            .collect();

        Self {
            resources: RwLock::new(resources),
        }
    }
}

impl ResourceProvider for MemoryProvider {
    fn get_resource(&self, _ctx: &ResolveContext, path: &str) -> Result<Option<Resource>> {
        Ok(self.resources.read().get(path).cloned())
    }

    fn list_children(&self, _ctx: &ResolveContext, parent: &Resource) -> Result<Vec<Resource>> {
        let prefix = path::join(parent.path(), "");
        let resources = self.resources.read();
        let children = resources
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| {
                let rest = &key[prefix.len()..];
                !rest.is_empty() && !rest.contains('/')
            })
            .map(|(_, resource)| resource.clone())
            .collect();

        Ok(children)
    }

    fn as_modifying(&self) -> Option<&dyn ModifyingProvider> {
        Some(self)
    }
}

impl ModifyingProvider for MemoryProvider {
    #[instrument(skip(self, _ctx, properties), level = "debug")]
    fn create(&self, _ctx: &ResolveContext, path: &str, properties: ValueMap) -> Result<Resource> {
        let mut resources = self.resources.write();
        if resources.contains_key(path) {
            return Err(ProviderError::AlreadyExists {
                path: path.to_owned(),
            });
        }

        let resource_type = match properties.get(PROPERTY_RESOURCE_TYPE) {
            Some(Value::String(resource_type)) => resource_type.clone(),
            _ => DEFAULT_RESOURCE_TYPE.to_owned(),
        };
        let resource = Resource::new(path, resource_type).with_properties(properties);
        resources.insert(path.to_owned(), resource.clone());
        debug!("created {path:?}");

        Ok(resource)
    }

    #[instrument(skip(self, _ctx), level = "debug")]
    fn delete(&self, _ctx: &ResolveContext, path: &str) -> Result<()> {
        let mut resources = self.resources.write();
        if resources.remove(path).is_none() {
            return Err(ProviderError::NotFound {
                path: path.to_owned(),
            });
        }

        // INVARIANT: Deleting a resource deletes its whole subtree.
        let prefix = path::join(path, "");
        resources.retain(|key, _| !key.starts_with(&prefix));
        debug!("deleted {path:?}");

        Ok(())
    }
}
