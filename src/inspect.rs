use rayon::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, instrument};
use walkdir::WalkDir;

use crate::package::{File, Package};
use crate::path::TreePath;
use crate::util;

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("failed to open folder {path}: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk folder {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to hash file {path}: {source}")]
    Hash {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read link target of {path}: {source}")]
    ReadLink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("path is not valid UTF-8: {0}")]
    NonUtf8(PathBuf),

    #[error("unknown filesystem object: {0}")]
    UnknownObject(PathBuf),
}

struct PendingFile {
    path: TreePath,
    full_path: PathBuf,
    executable: bool,
    size: u64,
}

fn tree_path(path: &Path) -> Result<TreePath, InspectError> {
    let s = path
        .to_str()
        .ok_or_else(|| InspectError::NonUtf8(path.to_path_buf()))?;
    Ok(TreePath::new(&s.replace('\\', "/")))
}

impl Package {
    /// Describe a directory as it currently is on disk.
    ///
    /// Symlinks are recorded with their literal target and never followed.
    /// Regular files are SHA-1 hashed in parallel. No sources are recorded.
    #[instrument(skip_all, fields(root = %root.display()))]
    pub fn try_from_inspected_folder(root: &Path) -> Result<Self, InspectError> {
        let root = root.canonicalize().map_err(|source| InspectError::Root {
            path: root.to_path_buf(),
            source,
        })?;

        let mut out = Package::default();
        let mut pending: Vec<PendingFile> = Vec::new();

        for entry in WalkDir::new(&root).min_depth(1).follow_links(false) {
            let entry = entry.map_err(|source| InspectError::Walk {
                path: root.clone(),
                source,
            })?;
            let full_path = entry.path();
            let relative = full_path
                .strip_prefix(&root)
                .map_err(|_| InspectError::UnknownObject(full_path.to_path_buf()))?;
            let path = tree_path(relative)?;
            let file_type = entry.file_type();

            if file_type.is_symlink() {
                let target =
                    std::fs::read_link(full_path).map_err(|source| InspectError::ReadLink {
                        path: full_path.to_path_buf(),
                        source,
                    })?;
                out.add_link(path, tree_path(&target)?);
            } else if file_type.is_dir() {
                out.add_folder(path);
            } else if file_type.is_file() {
                let meta = entry.metadata().map_err(|source| InspectError::Walk {
                    path: full_path.to_path_buf(),
                    source,
                })?;
                pending.push(PendingFile {
                    path,
                    full_path: full_path.to_path_buf(),
                    executable: util::is_executable(&meta),
                    size: meta.len(),
                });
            } else {
                return Err(InspectError::UnknownObject(full_path.to_path_buf()));
            }
        }

        debug!(files = pending.len(), "hashing inspected files");
        let hashed = pending
            .into_par_iter()
            .map(|p| -> Result<(TreePath, File), InspectError> {
                let hash =
                    util::hash_file_streaming(&p.full_path).map_err(|source| InspectError::Hash {
                        path: p.full_path.clone(),
                        source,
                    })?;
                Ok((
                    p.path,
                    File {
                        hash,
                        executable: p.executable,
                        size: p.size,
                    },
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (path, file) in hashed {
            out.add_file(path, file);
        }
        out.folders.insert(TreePath::root());
        Ok(out)
    }

    /// Inspect a folder, returning an invalid package on any error.
    pub fn from_inspected_folder(root: &Path) -> Self {
        Self::try_from_inspected_folder(root).unwrap_or_else(|e| {
            error!("Folder inspection failed: {e}");
            Self::invalid()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA1: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

    #[test]
    fn test_inspect_plain_tree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b.txt"), b"").unwrap();
        std::fs::write(dir.path().join("a/b/b.txt"), b"").unwrap();

        let p = Package::try_from_inspected_folder(dir.path()).unwrap();
        assert!(p.valid);
        assert_eq!(p.files.len(), 2);
        for name in ["a/b.txt", "a/b/b.txt"] {
            let file = &p.files[&TreePath::new(name)];
            assert_eq!(file.hash, EMPTY_SHA1);
            assert_eq!(file.size, 0);
            assert!(!file.executable);
        }
        assert_eq!(p.folders.len(), 3);
        assert!(p.folders.contains(&TreePath::root()));
        assert!(p.folders.contains(&TreePath::new("a")));
        assert!(p.folders.contains(&TreePath::new("a/b")));
        assert!(p.symlinks.is_empty());
        assert!(p.sources.is_empty());
    }

    #[test]
    fn test_inspect_hashes_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("space.txt"), b" ").unwrap();

        let p = Package::try_from_inspected_folder(dir.path()).unwrap();
        let file = &p.files[&TreePath::new("space.txt")];
        assert_eq!(file.hash, "b858cb282617fb0956d960215c8e84d1ccf909c6");
        assert_eq!(file.size, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_inspect_symlinks_and_exec_bits() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        let file = dir.path().join("a/b.txt");
        std::fs::write(&file, b"").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::os::unix::fs::symlink("../b.txt", dir.path().join("a/b/b.txt")).unwrap();

        let p = Package::try_from_inspected_folder(dir.path()).unwrap();
        assert_eq!(p.files.len(), 1);
        assert!(p.files[&TreePath::new("a/b.txt")].executable);
        assert_eq!(p.folders.len(), 3);
        assert_eq!(p.symlinks.len(), 1);
        assert_eq!(p.symlinks[&TreePath::new("a/b/b.txt")].to_string(), "../b.txt");
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink("nowhere/at/all", dir.path().join("dangling")).unwrap();

        let p = Package::try_from_inspected_folder(dir.path()).unwrap();
        assert_eq!(
            p.symlinks[&TreePath::new("dangling")],
            TreePath::new("nowhere/at/all")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_absolute_symlink_target_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink("/etc/hostname", dir.path().join("abs")).unwrap();

        let p = Package::try_from_inspected_folder(dir.path()).unwrap();
        let target = &p.symlinks[&TreePath::new("abs")];
        assert!(target.is_absolute());
        assert_eq!(target.to_string(), "/etc/hostname");

        // a manifest pointing at the relative twin must still relink
        let manifest = r#"{ "files": { "abs": { "type": "link", "target": "etc/hostname" } } }"#;
        let to = Package::from_manifest_contents(manifest.as_bytes());
        let ops = crate::update::UpdateOperations::resolve(&p, &to);
        assert_eq!(ops.deletes, [TreePath::new("abs")]);
        assert_eq!(ops.mklinks[&TreePath::new("abs")].to_string(), "etc/hostname");
    }

    #[cfg(unix)]
    #[test]
    fn test_socket_is_unknown_object() {
        let dir = tempfile::tempdir().unwrap();
        let _listener = std::os::unix::net::UnixListener::bind(dir.path().join("sock")).unwrap();

        assert!(matches!(
            Package::try_from_inspected_folder(dir.path()),
            Err(InspectError::UnknownObject(ref p)) if p.ends_with("sock")
        ));
        assert!(!Package::from_inspected_folder(dir.path()).valid);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_name_fails() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let name = OsStr::from_bytes(b"bad\xff");
        // some filesystems refuse non-UTF-8 names outright
        if std::fs::write(dir.path().join(name), b"").is_err() {
            return;
        }

        assert!(matches!(
            Package::try_from_inspected_folder(dir.path()),
            Err(InspectError::NonUtf8(_))
        ));
        assert!(!Package::from_inspected_folder(dir.path()).valid);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_link_target_fails() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(OsStr::from_bytes(b"to\xfe"), dir.path().join("link")).unwrap();

        assert!(matches!(
            Package::try_from_inspected_folder(dir.path()),
            Err(InspectError::NonUtf8(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_fails_hashing() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("locked");
        std::fs::write(&file, b"secret").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o000)).unwrap();
        // root reads anything
        if std::fs::read(&file).is_ok() {
            return;
        }

        assert!(matches!(
            Package::try_from_inspected_folder(dir.path()),
            Err(InspectError::Hash { .. })
        ));
    }

    #[test]
    fn test_missing_folder_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(
            Package::try_from_inspected_folder(&missing),
            Err(InspectError::Root { .. })
        ));
        assert!(!Package::from_inspected_folder(&missing).valid);
    }
}
