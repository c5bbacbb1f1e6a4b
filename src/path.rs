// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Resource path utilities.
//!
//! Resource paths are slash separated, absolute strings like
//! `/content/site/page`. They are not file system paths, so none of these
//! helpers touch [`std::path`]. The one exception is
//! [`default_config_path`], which locates the configuration file on disk.

use std::{iter::FusedIterator, path::PathBuf};

/// Split a resource path into its segments.
///
/// Leading and trailing slashes are ignored, so `"/a/b/"` and `"a/b"` both
/// yield `["a", "b"]`. The root path `"/"` and the empty path yield nothing.
/// Empty segments between doubled slashes are kept, mirroring how the
/// provider tree keys its nodes.
pub fn split(path: &str) -> Vec<&str> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Vec::new();
    }

    trimmed.split('/').collect()
}

/// Normalize a resource path.
///
/// Resolves `.` and `..` segments and collapses doubled slashes. Relative
/// paths stay relative. Returns `None` if `..` would climb above the root.
pub fn normalize(path: &str) -> Option<String> {
    let absolute = path.starts_with('/');
    let mut stack: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                stack.pop()?;
            }
            segment => stack.push(segment),
        }
    }

    let joined = stack.join("/");
    if absolute {
        Some(format!("/{joined}"))
    } else {
        Some(joined)
    }
}

/// Parent path of a resource path.
///
/// Returns `None` for the root path and for paths with no slash.
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" || path.is_empty() {
        return None;
    }

    let path = path.strip_suffix('/').unwrap_or(path);
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of a resource path.
pub fn name(path: &str) -> &str {
    let path = path.strip_suffix('/').unwrap_or(path);
    path.rsplit('/').next().unwrap_or(path)
}

/// Join a child name onto a parent path.
pub fn join(parent: &str, child: &str) -> String {
    let child = child.trim_start_matches('/');
    if parent.ends_with('/') {
        format!("{parent}{child}")
    } else {
        format!("{parent}/{child}")
    }
}

/// Convert a resource type into a path fragment.
///
/// Resource types may use `:` as a namespace separator, e.g.,
/// `sling:Folder` maps to `sling/Folder`.
pub fn resource_type_to_path(resource_type: &str) -> String {
    resource_type.replace(':', "/")
}

/// Candidate resource paths for a request path.
///
/// Starting with the full request path, every step removes the text from
/// the last dot onwards. This tries the most specific resource first.
/// Given `/some/stuff.a4.html/xyz.ext`, this yields:
///
/// 1. `/some/stuff.a4.html/xyz.ext`
/// 2. `/some/stuff.a4.html/xyz`
/// 3. `/some/stuff.a4`
/// 4. `/some/stuff`
///
/// Trailing slashes are stripped before the first candidate. The bare root
/// is never yielded.
#[derive(Debug, Clone)]
pub struct ResourcePaths {
    next_path: Option<String>,
}

impl ResourcePaths {
    /// Construct new candidate path iterator for request path.
    pub fn new(path: impl AsRef<str>) -> Self {
        let trimmed = path.as_ref().trim_end_matches('/');
        let next_path = (!trimmed.is_empty()).then(|| trimmed.to_owned());

        Self { next_path }
    }
}

impl Iterator for ResourcePaths {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next_path.take()?;

        // INVARIANT: A dot at the very start is not a selector separator, and
        // the bare root is never a candidate.
        self.next_path = current
            .rfind('.')
            .filter(|idx| *idx > 0)
            .map(|idx| current[..idx].trim_end_matches('/'))
            .filter(|candidate| !candidate.is_empty())
            .map(ToOwned::to_owned);

        Some(current)
    }
}

impl FusedIterator for ResourcePaths {}

/// Determine default absolute path to configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/slingshot/config.toml` as
/// the default. Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoConfigDir`] if configuration directory cannot be
///   determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("slingshot").join("config.toml"))
        .ok_or(NoConfigDir)
}

/// No way to determine user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoConfigDir;

/// Friendly result alias :3
pub type Result<T, E = NoConfigDir> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case("/a/b.c.d", &["/a/b.c.d", "/a/b.c", "/a/b"]; "selectors and extension")]
    #[test_case(
        "/some/stuff.a4.html/xyz.ext",
        &["/some/stuff.a4.html/xyz.ext", "/some/stuff.a4.html/xyz", "/some/stuff.a4", "/some/stuff"];
        "dots before suffix"
    )]
    #[test_case("/a/b/", &["/a/b"]; "trailing slash stripped")]
    #[test_case("/a/b.html//", &["/a/b.html", "/a/b"]; "many trailing slashes")]
    #[test_case("/.hidden", &["/.hidden"]; "dot directly after root")]
    #[test_case("/a/.b", &["/a/.b", "/a"]; "dot directly after slash")]
    #[test_case("/", &[]; "root only")]
    #[test_case("///", &[]; "slashes only")]
    #[test_case("", &[]; "empty path")]
    #[test_case(".x", &[".x"]; "leading dot")]
    #[test]
    fn resource_paths_candidates(path: &str, expect: &[&str]) {
        let result = ResourcePaths::new(path).collect::<Vec<_>>();
        assert_eq!(result, expect);
    }

    #[test]
    fn resource_paths_is_fused() {
        let mut paths = ResourcePaths::new("/a");
        assert_eq!(paths.next().as_deref(), Some("/a"));
        assert_eq!(paths.next(), None);
        assert_eq!(paths.next(), None);
    }

    #[test_case("/", &[]; "root")]
    #[test_case("", &[]; "empty")]
    #[test_case("/a/b/c", &["a", "b", "c"]; "absolute")]
    #[test_case("a/b/", &["a", "b"]; "relative with trailing slash")]
    #[test_case("//a//b", &["a", "", "b"]; "doubled slashes")]
    #[test]
    fn split_segments(path: &str, expect: &[&str]) {
        assert_eq!(split(path), expect);
    }

    #[test_case("/a/./b/../c", Some("/a/c"); "dots resolved")]
    #[test_case("/a//b/", Some("/a/b"); "slashes collapsed")]
    #[test_case("/a/../..", None; "above root")]
    #[test_case("a/b/..", Some("a"); "relative")]
    #[test_case("/", Some("/"); "root")]
    #[test]
    fn normalize_paths(path: &str, expect: Option<&str>) {
        assert_eq!(normalize(path).as_deref(), expect);
    }

    #[test]
    fn parent_and_name() {
        assert_eq!(parent("/a/b/c"), Some("/a/b"));
        assert_eq!(parent("/a"), Some("/"));
        assert_eq!(parent("/"), None);
        assert_eq!(parent("a"), None);
        assert_eq!(name("/a/b/c"), "c");
        assert_eq!(name("/a/b/"), "b");
        assert_eq!(name("/"), "");
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "/b"), "/a/b");
        assert_eq!(resource_type_to_path("sling:Folder"), "sling/Folder");
    }
}
