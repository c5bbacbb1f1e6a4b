// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Script location.
//!
//! Resources are rendered by scripts stored in the resource tree itself.
//! Which script renders a resource follows from its resource type and the
//! selectors, extension, and method of the request.
//!
//! # Locations
//!
//! A resource type like `site/page` names a directory relative to every
//! search path, so `/apps/site/page` and `/libs/site/page` are searched in
//! that order. If neither has a fitting script, the super type of the
//! resource type is searched next, and so on up the chain. The default
//! resource type `sling/servlet/default` is always searched last.
//!
//! # Script Names
//!
//! Within a location named `page`, a GET request for `page.print.a4.html`
//! checks the following script base names in order:
//!
//! 1. `print/a4.html`
//! 2. `print/a4`
//! 3. `print.html`
//! 4. `print`
//! 5. `page.html`
//! 6. `html`
//! 7. `page`
//! 8. `GET`
//!
//! Any other method only checks its own name, e.g., `POST`. A script matches
//! a base name if the script name is the base name followed by a dot and
//! one of the known script extensions, e.g., `html.jsp`.

use crate::{
    path,
    request::RequestPathInfo,
    resolver::{ResourceResolver, Result},
    resource::Resource,
};

use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, instrument, warn};

/// Resource type searched when nothing more specific fits.
pub const DEFAULT_RESOURCE_TYPE: &str = "sling/servlet/default";

/// Script extensions known when none are configured.
pub const DEFAULT_SCRIPT_EXTENSIONS: [&str; 4] = ["jsp", "esp", "ecma", "html"];

/// Candidate script directories of a resource.
///
/// Super types are looked up lazily, so a script found early never pays
/// for walking the rest of the chain. A resource type already visited ends
/// the chain, cutting cycles. Types are compared in their path form, so
/// `site:page` and `site/page` count as the same type.
pub struct Locations<'a> {
    resolver: &'a ResourceResolver,
    pending: VecDeque<String>,
    next_type: Option<String>,
    explicit_super_type: Option<String>,
    visited: HashSet<String>,
}

impl<'a> Locations<'a> {
    pub fn new(resolver: &'a ResourceResolver, resource: &Resource) -> Self {
        let resource_type = resource.resource_type().to_owned();
        Self {
            resolver,
            pending: VecDeque::new(),
            visited: HashSet::from([path::resource_type_to_path(&resource_type)]),
            next_type: Some(resource_type),
            explicit_super_type: resource.resource_super_type().map(ToOwned::to_owned),
        }
    }

    fn super_type_of(&mut self, resource_type: &str) -> Option<String> {
        if let Some(super_type) = self.explicit_super_type.take() {
            return Some(super_type);
        }

        self.resolver
            .parent_resource_type_of(resource_type)
            .unwrap_or_else(|error| {
                warn!("cannot look up super type of {resource_type:?}: {error}");
                None
            })
    }
}

impl Iterator for Locations<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(location) = self.pending.pop_front() {
                return Some(location);
            }

            let resource_type = self.next_type.take()?;
            let type_path = path::resource_type_to_path(&resource_type);
            if type_path.starts_with('/') {
                self.pending.push_back(type_path);
            } else {
                let search_paths = self.resolver.search_paths().unwrap_or_else(|error| {
                    warn!("cannot search for {resource_type:?}: {error}");
                    &[][..]
                });
                self.pending.extend(
                    search_paths
                        .iter()
                        .map(|search_path| path::join(search_path, &type_path)),
                );
            }

            let super_type = self.super_type_of(&resource_type);
            self.next_type = super_type.filter(|super_type| {
                self.visited
                    .insert(path::resource_type_to_path(super_type))
            });
            if self.next_type.is_none() && self.visited.insert(DEFAULT_RESOURCE_TYPE.to_owned()) {
                self.next_type = Some(DEFAULT_RESOURCE_TYPE.to_owned());
            }
        }
    }
}

/// Finds the script rendering a resource.
#[derive(Debug, Clone)]
pub struct ScriptResolver {
    extensions: Vec<String>,
}

impl Default for ScriptResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SCRIPT_EXTENSIONS)
    }
}

impl ScriptResolver {
    /// Construct new script resolver knowing given script extensions.
    pub fn new(extensions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Find script for resource, request path info, and method.
    ///
    /// Returns `None` if no location holds a fitting script.
    ///
    /// # Errors
    ///
    /// - Return [`ResolverError`] if the resource tree cannot be read.
    ///
    /// [`ResolverError`]: crate::resolver::ResolverError
    #[instrument(skip(self, resolver, resource, info), fields(resource = resource.path()), level = "debug")]
    pub fn find(
        &self,
        resolver: &ResourceResolver,
        resource: &Resource,
        info: &RequestPathInfo,
        method: &str,
    ) -> Result<Option<Resource>> {
        let mut listings: HashMap<String, Vec<Resource>> = HashMap::new();
        for location in Locations::new(resolver, resource) {
            if resolver.get_resource(&location)?.is_none() {
                continue;
            }

            for candidate in script_candidates(path::name(&location), info, method) {
                let (dir, base) = match candidate.rsplit_once('/') {
                    Some((dir, base)) => (path::join(&location, dir), base.to_owned()),
                    None => (location.clone(), candidate),
                };

                if !listings.contains_key(&dir) {
                    let scripts = match resolver.get_resource(&dir)? {
                        Some(parent) => resolver.list_children(&parent)?.collect(),
                        None => Vec::new(),
                    };
                    listings.insert(dir.clone(), scripts);
                }

                let scripts = listings.get(&dir).map(Vec::as_slice).unwrap_or_default();
                if let Some(script) = scripts.iter().find(|script| self.matches(script, &base)) {
                    debug!("found script {:?}", script.path());
                    return Ok(Some(script.clone()));
                }
            }
        }

        debug!("no script found");
        Ok(None)
    }

    fn matches(&self, script: &Resource, base: &str) -> bool {
        match script.name().rsplit_once('.') {
            Some((stem, extension)) => {
                stem == base && self.extensions.iter().any(|known| known == extension)
            }
            None => false,
        }
    }
}

/// Script base names to check in a location, most specific first.
fn script_candidates(type_name: &str, info: &RequestPathInfo, method: &str) -> Vec<String> {
    let method = method.to_ascii_uppercase();
    if method != "GET" && method != "HEAD" {
        return vec![method];
    }

    let mut candidates = Vec::new();
    let extension = info.extension();
    let selectors = info.selectors();
    for count in (1..=selectors.len()).rev() {
        let selector_path = selectors[..count].join("/");
        if let Some(extension) = extension {
            candidates.push(format!("{selector_path}.{extension}"));
        }
        candidates.push(selector_path);
    }

    if let Some(extension) = extension {
        candidates.push(format!("{type_name}.{extension}"));
        candidates.push(extension.to_owned());
    }
    candidates.push(type_name.to_owned());
    candidates.push("GET".to_owned());

    candidates
}
