// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Request path decomposition.
//!
//! After a request path is resolved to a resource, whatever the resource
//! path did not consume is the __resolution path info__. It breaks down into
//! selectors, an extension, and a suffix:
//!
//! ```text
//! /content/page.print.a4.html/extra/info
//! |-----------||-------||---||---------|
//!  resource    selectors ext   suffix
//! ```

use crate::resource::Resource;

/// Decomposed request path of a resolved resource.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RequestPathInfo {
    resource_path: String,
    selectors: Vec<String>,
    extension: Option<String>,
    suffix: Option<String>,
}

impl RequestPathInfo {
    /// Decompose resolution path info of resource.
    pub fn new(resource: &Resource) -> Self {
        let metadata = resource.metadata();
        let info = metadata.resolution_path_info.as_str();
        let mut path_info = Self {
            resource_path: metadata.resolution_path.clone(),
            ..Default::default()
        };

        // INVARIANT: Info not led by a dot has neither selectors nor extension.
        if !info.starts_with('.') {
            path_info.suffix = (!info.is_empty()).then(|| info.to_owned());
            return path_info;
        }

        let (head, suffix) = match info.find('/') {
            Some(idx) => (&info[..idx], Some(&info[idx..])),
            None => (info, None),
        };
        path_info.suffix = suffix.map(ToOwned::to_owned);

        if let Some(last_dot) = head.rfind('.') {
            let extension = &head[last_dot + 1..];
            path_info.extension = (!extension.is_empty()).then(|| extension.to_owned());
            if last_dot > 0 {
                path_info.selectors = head[1..last_dot]
                    .split('.')
                    .filter(|selector| !selector.is_empty())
                    .map(ToOwned::to_owned)
                    .collect();
            }
        }

        path_info
    }

    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    pub fn selectors(&self) -> &[String] {
        &self.selectors
    }

    /// Selectors joined back together by dots, if any.
    pub fn selector_string(&self) -> Option<String> {
        (!self.selectors.is_empty()).then(|| self.selectors.join("."))
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    fn info(resolution_path_info: &str) -> RequestPathInfo {
        let mut resource = Resource::new("/content/page", "site/page");
        resource.metadata_mut().resolution_path_info = resolution_path_info.into();
        RequestPathInfo::new(&resource)
    }

    #[test_case("", &[], None, None; "nothing")]
    #[test_case(".html", &[], Some("html"), None; "extension only")]
    #[test_case(".print.a4.html", &["print", "a4"], Some("html"), None; "selectors")]
    #[test_case(".html/extra/info", &[], Some("html"), Some("/extra/info"); "suffix")]
    #[test_case(".a..b.html", &["a", "b"], Some("html"), None; "empty selector dropped")]
    #[test_case(".a.", &["a"], None, None; "trailing dot")]
    #[test_case("/extra.html", &[], None, Some("/extra.html"); "no leading dot")]
    #[test]
    fn decompose(
        path_info: &str,
        selectors: &[&str],
        extension: Option<&str>,
        suffix: Option<&str>,
    ) {
        let result = info(path_info);
        assert_eq!(result.resource_path(), "/content/page");
        assert_eq!(result.selectors(), selectors);
        assert_eq!(result.extension(), extension);
        assert_eq!(result.suffix(), suffix);
    }

    #[test]
    fn selector_string_joins_selectors() {
        assert_eq!(info(".print.a4.html").selector_string(), Some("print.a4".into()));
        assert_eq!(info(".html").selector_string(), None);
    }
}
