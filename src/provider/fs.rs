// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! File system resource provider.
//!
//! Maps a directory on disk onto a mount path of the resource tree. Every
//! directory becomes an `nt:folder` resource and every file an `nt:file`
//! resource carrying its size. Hidden and ignored files are skipped when
//! listing children, following the same filter rules as ripgrep.
//!
//! The provider is read-only. Files are consulted on every call, so edits
//! on disk become visible immediately.

use crate::{
    path,
    provider::{ProviderError, ResolveContext, ResourceProvider, Result},
    resource::Resource,
};

use ignore::WalkBuilder;
use std::{
    fs::{metadata, Metadata},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Resource type of directories.
pub const RESOURCE_TYPE_FOLDER: &str = "nt:folder";

/// Resource type of files.
pub const RESOURCE_TYPE_FILE: &str = "nt:file";

/// Resource provider backed by a directory.
#[derive(Debug, Clone)]
pub struct FsProvider {
    root: String,
    source: PathBuf,
}

impl FsProvider {
    /// Construct new file system provider.
    ///
    /// Resources below `root` are looked up relative to `source`.
    pub fn new(root: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = match root.trim_end_matches('/') {
            "" => "/".to_owned(),
            trimmed => trimmed.to_owned(),
        };

        Self {
            root,
            source: source.into(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn source(&self) -> &Path {
        self.source.as_path()
    }

    /// Map resource path to file path.
    ///
    /// Return `None` if resource path is outside of root.
    fn file_for(&self, resource_path: &str) -> Option<PathBuf> {
        let rest = if self.root == "/" {
            resource_path
        } else if resource_path == self.root {
            ""
        } else {
            resource_path.strip_prefix(&self.root)?.strip_prefix('/')?
        };

        let mut file = self.source.clone();
        for segment in path::split(rest) {
            // INVARIANT: Never escape the source directory.
            if segment.is_empty() || segment == "." || segment == ".." {
                return None;
            }
            file.push(segment);
        }

        Some(file)
    }

    fn describe(resource_path: &str, meta: &Metadata) -> Resource {
        if meta.is_dir() {
            Resource::new(resource_path, RESOURCE_TYPE_FOLDER)
        } else {
            let size = i64::try_from(meta.len()).unwrap_or(i64::MAX);
            Resource::new(resource_path, RESOURCE_TYPE_FILE).with_property("size", size)
        }
    }
}

impl ResourceProvider for FsProvider {
    fn get_resource(&self, _ctx: &ResolveContext, path: &str) -> Result<Option<Resource>> {
        let Some(file) = self.file_for(path) else {
            return Ok(None);
        };

        match metadata(&file) {
            Ok(meta) => Ok(Some(Self::describe(path, &meta))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ProviderError::Io { source: err, file }),
        }
    }

    fn list_children(&self, _ctx: &ResolveContext, parent: &Resource) -> Result<Vec<Resource>> {
        let Some(dir) = self.file_for(parent.path()) else {
            return Ok(Vec::new());
        };

        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut children = Vec::new();
        let walker = WalkBuilder::new(&dir)
            .max_depth(Some(1))
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();
        for entry in walker {
            let entry = entry?;

            // INVARIANT: Depth zero is the parent directory itself.
            if entry.depth() == 0 {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            let child_path = path::join(parent.path(), &name);
            let meta = entry.metadata()?;
            children.push(Self::describe(&child_path, &meta));
        }
        debug!("listed {} children of {:?}", children.len(), dir.display());

        Ok(children)
    }
}
