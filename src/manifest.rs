//! JSON package manifests.
//!
//! ```json
//! { "files": {
//!     "bin":         { "type": "directory" },
//!     "bin/java":    { "type": "file", "executable": true,
//!                      "downloads": { "raw":  { "url": "...", "sha1": "...", "size": 12 },
//!                                     "lzma": { "url": "...", "sha1": "...", "size": 9 } } },
//!     "lib/current": { "type": "link", "target": "../lib/v2" } } }
//! ```

use serde::de::{Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::package::{File, Package};
use crate::path::TreePath;
use crate::source::{Compression, FileSource};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed manifest: {0}")]
    Syntax(#[source] serde_json::Error),

    #[error("invalid manifest entry {path}: {source}")]
    Entry {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("duplicate path inside manifest: {0}")]
    Duplicate(TreePath),

    #[error("manifest path leaves the package tree: {0}")]
    Escaping(String),

    #[error("no valid compression method for file {0}")]
    NoValidSource(TreePath),

    #[error("file {0} has no raw download")]
    MissingRaw(TreePath),

    #[error("{0} is declared both as a directory and as a file or link")]
    Conflict(TreePath),
}

/// Top level of a manifest. Keys other than `files` are ignored.
#[derive(Default)]
struct ManifestDocument {
    files: Vec<(String, serde_json::Value)>,
}

/// The `files` object, in document order and with duplicate keys preserved.
struct EntryList(Vec<(String, serde_json::Value)>);

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Entry {
    Directory,
    File {
        #[serde(default)]
        executable: bool,
        downloads: BTreeMap<String, Download>,
    },
    Link {
        target: String,
    },
}

#[derive(Deserialize)]
struct Download {
    url: String,
    sha1: String,
    size: u64,
}

impl<'de> Deserialize<'de> for ManifestDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DocumentVisitor;

        impl<'de> Visitor<'de> for DocumentVisitor {
            type Value = ManifestDocument;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a manifest object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut doc = ManifestDocument::default();
                while let Some(key) = map.next_key::<String>()? {
                    if key == "files" {
                        doc.files = map.next_value::<EntryList>()?.0;
                    } else {
                        map.next_value::<IgnoredAny>()?;
                    }
                }
                Ok(doc)
            }
        }

        deserializer.deserialize_map(DocumentVisitor)
    }
}

impl<'de> Deserialize<'de> for EntryList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntryListVisitor;

        impl<'de> Visitor<'de> for EntryListVisitor {
            type Value = EntryList;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping paths to entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, serde_json::Value>()? {
                    entries.push((key, value));
                }
                Ok(EntryList(entries))
            }
        }

        deserializer.deserialize_map(EntryListVisitor)
    }
}

fn parse_file_entry(
    path: &TreePath,
    executable: bool,
    downloads: BTreeMap<String, Download>,
) -> Result<(File, FileSource), ManifestError> {
    let mut best = FileSource::default();
    let mut raw: Option<(String, u64)> = None;

    for (key, download) in downloads {
        let compression = Compression::from_key(&key);
        match compression {
            Compression::Unknown => continue,
            Compression::Raw => raw = Some((download.sha1.clone(), download.size)),
            Compression::Lzma => {}
        }
        best.upgrade(FileSource {
            compression,
            hash: download.sha1,
            url: download.url,
            size: download.size,
        });
    }

    if best.is_bad() {
        return Err(ManifestError::NoValidSource(path.clone()));
    }
    let (hash, size) = raw.ok_or_else(|| ManifestError::MissingRaw(path.clone()))?;
    Ok((
        File {
            hash,
            executable,
            size,
        },
        best,
    ))
}

fn build_package(doc: ManifestDocument) -> Result<Package, ManifestError> {
    let mut out = Package::default();
    let mut seen = BTreeSet::new();

    for (key, value) in doc.files {
        let path = TreePath::new(&key);
        if path.is_escaping() {
            return Err(ManifestError::Escaping(key));
        }
        if !seen.insert(path.clone()) {
            return Err(ManifestError::Duplicate(path));
        }

        let entry: Entry = serde_json::from_value(value)
            .map_err(|source| ManifestError::Entry { path: key, source })?;
        match entry {
            Entry::Directory => out.add_folder(path),
            Entry::File {
                executable,
                downloads,
            } => {
                let (file, source) = parse_file_entry(&path, executable, downloads)?;
                out.add_source(file.hash.clone(), source);
                out.add_file(path, file);
            }
            Entry::Link { target } => out.add_link(path, TreePath::new(&target)),
        }
    }

    out.folders.insert(TreePath::root());

    // A file declared at "a" and another at "a/b" turns "a" into a folder too.
    if let Some(clash) = out
        .files
        .keys()
        .chain(out.symlinks.keys())
        .find(|p| out.folders.contains(*p))
    {
        return Err(ManifestError::Conflict(clash.clone()));
    }

    Ok(out)
}

impl Package {
    pub fn try_from_manifest_contents(contents: &[u8]) -> Result<Self, ManifestError> {
        let doc: ManifestDocument =
            serde_json::from_slice(contents).map_err(ManifestError::Syntax)?;
        build_package(doc)
    }

    pub fn try_from_manifest_file(path: &Path) -> Result<Self, ManifestError> {
        let contents = std::fs::read(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::try_from_manifest_contents(&contents)
    }

    /// Parse a manifest, returning an invalid package on any error.
    pub fn from_manifest_contents(contents: &[u8]) -> Self {
        Self::try_from_manifest_contents(contents).unwrap_or_else(|e| {
            debug!("Unable to parse manifest: {e}");
            Self::invalid()
        })
    }

    pub fn from_manifest_file(path: &Path) -> Self {
        Self::try_from_manifest_file(path).unwrap_or_else(|e| {
            debug!("Unable to parse manifest file {}: {e}", path.display());
            Self::invalid()
        })
    }
}
