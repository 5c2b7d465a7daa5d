use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::path::TreePath;
use crate::source::{FileDownload, FileSource};

/// Desired (or observed) content of a single regular file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// Lowercase hex SHA-1 of the uncompressed content.
    pub hash: String,
    pub executable: bool,
    pub size: u64,
}

/// Snapshot of a directory tree.
///
/// Built from a JSON manifest (the desired state, with download sources) or by
/// inspecting a directory on disk (the current state, without sources). The
/// parent chain of every file and link is present in `folders`, and a path
/// belongs to at most one of `folders`, `files` and `symlinks`.
///
/// `valid == false` means the package could not be built. Such a package must
/// not be diffed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub valid: bool,
    pub folders: BTreeSet<TreePath>,
    pub files: BTreeMap<TreePath, File>,
    pub symlinks: BTreeMap<TreePath, TreePath>,
    /// Best known transport per content hash.
    pub sources: BTreeMap<String, FileSource>,
}

impl Default for Package {
    fn default() -> Self {
        Self {
            valid: true,
            folders: BTreeSet::new(),
            files: BTreeMap::new(),
            symlinks: BTreeMap::new(),
            sources: BTreeMap::new(),
        }
    }
}

impl Package {
    /// A package marking a failed construction.
    pub fn invalid() -> Self {
        Self {
            valid: false,
            ..Self::default()
        }
    }

    pub(crate) fn add_file(&mut self, path: TreePath, file: File) {
        self.add_folder(path.parent_path());
        self.files.insert(path, file);
    }

    /// Insert `folder` and all of its ancestors, except the root.
    pub(crate) fn add_folder(&mut self, mut folder: TreePath) {
        while folder.has_parent_path() {
            let parent = folder.parent_path();
            self.folders.insert(folder);
            folder = parent;
        }
    }

    pub(crate) fn add_link(&mut self, path: TreePath, target: TreePath) {
        self.add_folder(path.parent_path());
        self.symlinks.insert(path, target);
    }

    pub(crate) fn add_source(&mut self, content_hash: String, source: FileSource) {
        self.sources.insert(content_hash, source);
    }

    /// Everything needed to download `file` into this package.
    ///
    /// Packages without sources (inspected folders) yield a bad source that
    /// still carries the expected hash and size; the apply step refuses it.
    pub fn download_for(&self, file: &File) -> FileDownload {
        let source = self.sources.get(&file.hash).cloned().unwrap_or_else(|| FileSource {
            hash: file.hash.clone(),
            size: file.size,
            ..FileSource::default()
        });
        FileDownload::new(source, file.executable)
    }

    /// Total number of nodes, the root folder included.
    pub fn len(&self) -> usize {
        self.folders.len() + self.files.len() + self.symlinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_file_bytes(&self) -> u64 {
        self.files.values().map(|f| f.size).sum()
    }
}
