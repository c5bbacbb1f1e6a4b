// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Resource representation.
//!
//! A __resource__ is the unit of content that a request resolves to. It is
//! addressed by an absolute path, typed by a resource type, and carries a
//! map of properties. Resources are produced by resource providers on
//! demand and are discarded once the request that asked for them is done.
//!
//! # Synthetic Resources
//!
//! Not every path that can be traversed has content behind it. Mounting a
//! provider at `/apps/site` implies that `/apps` exists, even when no
//! provider contributes a resource there. Such placeholders are
//! __synthetic__ resources. They only exist to allow tree traversal, and
//! are always overridden by a concrete resource at the same path.
//!
//! # Non-Existing Resources
//!
//! Resolving a request path never fails for lack of content. Instead, a
//! __non-existing__ resource is produced whose resolution path is the
//! requested path. This lets the caller pick an error script through the
//! same machinery used for real content.

use crate::path;

use std::collections::BTreeMap;

/// Resource type of synthetic resources.
pub const RESOURCE_TYPE_SYNTHETIC: &str = "sling:syntheticResourceType";

/// Resource type of non-existing resources.
pub const RESOURCE_TYPE_NON_EXISTING: &str = "sling:nonexisting";

/// Property naming the resource super type of a resource type resource.
pub const PROPERTY_RESOURCE_SUPER_TYPE: &str = "sling:resourceSuperType";

/// Property holding alternative names of a resource in request paths.
pub const PROPERTY_ALIAS: &str = "sling:alias";

/// Property value type.
pub type Value = toml::Value;

/// Property map of a resource.
pub type ValueMap = BTreeMap<String, Value>;

/// Content resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    path: String,
    resource_type: String,
    resource_super_type: Option<String>,
    properties: ValueMap,
    metadata: ResourceMetadata,
}

impl Resource {
    /// Construct new resource.
    ///
    /// Resolution path defaults to the resource path itself.
    pub fn new(path: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            metadata: ResourceMetadata::new(path.clone()),
            path,
            resource_type: resource_type.into(),
            resource_super_type: None,
            properties: ValueMap::new(),
        }
    }

    /// Construct new synthetic resource.
    pub fn synthetic(path: impl Into<String>) -> Self {
        Self::new(path, RESOURCE_TYPE_SYNTHETIC)
    }

    /// Construct new non-existing resource.
    pub fn non_existing(path: impl Into<String>) -> Self {
        Self::new(path, RESOURCE_TYPE_NON_EXISTING)
    }

    /// Set resource super type.
    pub fn with_super_type(mut self, super_type: impl Into<String>) -> Self {
        self.resource_super_type = Some(super_type.into());
        self
    }

    /// Set a property.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Replace all properties.
    pub fn with_properties(mut self, properties: ValueMap) -> Self {
        self.properties = properties;
        self
    }

    /// Flag resource such that resolution continues past its provider.
    ///
    /// The resource is then only used if no other provider has anything
    /// better to offer for the same path.
    pub fn with_continue_resolving(mut self) -> Self {
        self.metadata.continue_resolving = true;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn resource_super_type(&self) -> Option<&str> {
        self.resource_super_type.as_deref()
    }

    pub fn properties(&self) -> &ValueMap {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn metadata(&self) -> &ResourceMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut ResourceMetadata {
        &mut self.metadata
    }

    /// Last segment of resource path.
    pub fn name(&self) -> &str {
        path::name(&self.path)
    }

    /// Path of parent resource, if any.
    pub fn parent_path(&self) -> Option<&str> {
        path::parent(&self.path)
    }

    /// Super type of resource, either set directly or through the
    /// `sling:resourceSuperType` property.
    pub fn super_type(&self) -> Option<&str> {
        self.resource_super_type().or_else(|| {
            self.property(PROPERTY_RESOURCE_SUPER_TYPE)
                .and_then(Value::as_str)
        })
    }

    /// Names given by the `sling:alias` property.
    ///
    /// The property may hold a single string or an array of strings. Empty
    /// names and non-string entries are skipped.
    pub fn aliases(&self) -> Vec<&str> {
        let aliases = match self.property(PROPERTY_ALIAS) {
            Some(Value::String(alias)) => vec![alias.as_str()],
            Some(Value::Array(aliases)) => aliases.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };

        aliases.into_iter().filter(|alias| !alias.is_empty()).collect()
    }

    pub fn is_synthetic(&self) -> bool {
        self.resource_type == RESOURCE_TYPE_SYNTHETIC
    }

    pub fn is_non_existing(&self) -> bool {
        self.resource_type == RESOURCE_TYPE_NON_EXISTING
    }
}

/// Resource metadata.
///
/// Information about how a resource was obtained, as opposed to the
/// content it carries.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResourceMetadata {
    /// Path under which the resource was resolved.
    pub resolution_path: String,

    /// Remainder of request path after the resolution path.
    pub resolution_path_info: String,

    /// Name of provider that produced the resource.
    pub provider: Option<String>,

    pub(crate) continue_resolving: bool,
}

impl ResourceMetadata {
    /// Construct new metadata resolved at target path.
    pub fn new(resolution_path: impl Into<String>) -> Self {
        Self {
            resolution_path: resolution_path.into(),
            ..Default::default()
        }
    }

    /// Check if resolution should continue past this resource.
    pub fn continue_resolving(&self) -> bool {
        self.continue_resolving
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn resolution_path_defaults_to_path() {
        let resource = Resource::new("/content/page", "site/page");
        assert_eq!(resource.metadata().resolution_path, "/content/page");
        assert_eq!(resource.metadata().resolution_path_info, "");
        assert_eq!(resource.name(), "page");
        assert_eq!(resource.parent_path(), Some("/content"));
    }

    #[test]
    fn synthetic_and_non_existing() {
        assert!(Resource::synthetic("/apps").is_synthetic());
        assert!(!Resource::synthetic("/apps").is_non_existing());
        assert!(Resource::non_existing("/nope").is_non_existing());
        assert!(!Resource::new("/a", "t").is_synthetic());
    }

    #[test]
    fn properties() {
        let resource = Resource::new("/a", "t")
            .with_super_type("base/t")
            .with_property("title", "Hello")
            .with_property("count", 3_i64);
        assert_eq!(resource.resource_super_type(), Some("base/t"));
        assert_eq!(resource.property("title"), Some(&Value::from("Hello")));
        assert_eq!(resource.property("count"), Some(&Value::Integer(3)));
        assert_eq!(resource.property("missing"), None);
    }

    #[test]
    fn super_type_prefers_direct_setting() {
        let resource = Resource::new("/apps/site/page", "sling:Folder")
            .with_property(PROPERTY_RESOURCE_SUPER_TYPE, "site/base");
        assert_eq!(resource.super_type(), Some("site/base"));

        let resource = resource.with_super_type("site/other");
        assert_eq!(resource.super_type(), Some("site/other"));
        assert_eq!(Resource::new("/a", "t").super_type(), None);
    }

    #[test]
    fn aliases_from_string_or_array() {
        let resource = Resource::new("/content/page", "t").with_property(PROPERTY_ALIAS, "seite");
        assert_eq!(resource.aliases(), vec!["seite"]);

        let names = Value::Array(vec!["a".into(), "".into(), Value::Integer(1), "b".into()]);
        let resource = Resource::new("/content/page", "t").with_property(PROPERTY_ALIAS, names);
        assert_eq!(resource.aliases(), vec!["a", "b"]);

        let resource = Resource::new("/content/page", "t").with_property(PROPERTY_ALIAS, 3_i64);
        assert!(resource.aliases().is_empty());
    }
}
