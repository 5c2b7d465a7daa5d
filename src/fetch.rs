//! The seam between an update plan and whatever actually moves bytes.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use crate::source::{FileDownload, FileSource};
use crate::util;

/// Obtains the blob described by a download.
///
/// Implementations return the transported bytes; [`verify`] is applied to
/// them before anything is written.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, download: &FileDownload) -> Result<Vec<u8>>;
}

/// Serves blobs from a local content-addressed directory, `<root>/<sha1>`.
#[derive(Debug, Clone)]
pub struct MirrorFetcher {
    root: PathBuf,
}

impl MirrorFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store `data` under its own hash. Returns the hash.
    pub fn insert(&self, data: &[u8]) -> Result<String> {
        let hash = util::hash_bytes(data);
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create mirror: {}", self.root.display()))?;
        let blob = self.root.join(&hash);
        std::fs::write(&blob, data)
            .with_context(|| format!("Failed to write blob: {}", blob.display()))?;
        Ok(hash)
    }
}

impl Fetcher for MirrorFetcher {
    fn fetch(&self, download: &FileDownload) -> Result<Vec<u8>> {
        let hash = &download.source.hash;
        // the hash becomes a file name, so it must be exactly 20 hex-encoded bytes
        if hex::decode(hash).map(|b| b.len()).ok() != Some(20) {
            bail!("Not a SHA-1 hash: {:?}", hash);
        }
        let blob = self.root.join(hash);
        std::fs::read(&blob).with_context(|| format!("Blob not in mirror: {}", blob.display()))
    }
}

/// Check fetched bytes against the size and hash the source advertises.
pub fn verify(source: &FileSource, data: &[u8]) -> Result<()> {
    if data.len() as u64 != source.size {
        bail!(
            "Size mismatch for {}: expected {} bytes, got {}",
            source.url,
            source.size,
            data.len()
        );
    }
    let actual = util::hash_bytes(data);
    if actual != source.hash {
        bail!(
            "Hash mismatch for {}: expected {}, got {}",
            source.url,
            source.hash,
            actual
        );
    }
    Ok(())
}
