use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::fetch::{self, Fetcher};
use crate::path::TreePath;
use crate::source::Compression;
use crate::update::UpdateOperations;
use crate::util;

const PART_SUFFIX: &str = ".treesync-part";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub deleted: usize,
    pub dirs_removed: usize,
    pub dirs_created: usize,
    pub files_downloaded: usize,
    pub bytes_downloaded: u64,
    pub links_created: usize,
    pub permissions_fixed: usize,
}

/// Apply an update plan to `target_dir` on a blocking thread.
pub async fn apply_plan<F>(
    target_dir: &Path,
    plan: UpdateOperations,
    fetcher: Arc<F>,
) -> Result<ApplySummary>
where
    F: Fetcher + 'static,
{
    let target = target_dir.to_path_buf();
    tokio::task::spawn_blocking(move || apply_plan_blocking(&target, &plan, fetcher.as_ref()))
        .await?
}

/// Apply an update plan to `target_dir`.
///
/// Categories run in order: deletes, rmdirs, mkdirs, downloads (in
/// parallel), links, permission fixes. Missing files and folders are not an
/// error when deleting. The target root itself is never removed.
#[instrument(skip(plan, fetcher), fields(target = %target_dir.display()))]
pub fn apply_plan_blocking(
    target_dir: &Path,
    plan: &UpdateOperations,
    fetcher: &dyn Fetcher,
) -> Result<ApplySummary> {
    if !plan.valid {
        bail!("Refusing to apply an invalid update plan");
    }
    if let Some(path) = plan.touched_paths().find(|p| p.is_escaping()) {
        bail!("Update plan touches a path outside the target: {}", path);
    }

    std::fs::create_dir_all(target_dir)
        .with_context(|| format!("Failed to create target: {}", target_dir.display()))?;
    let target = target_dir
        .canonicalize()
        .with_context(|| format!("Failed to canonicalize target: {}", target_dir.display()))?;

    let mut summary = ApplySummary::default();

    // 1. Deletes (files and links)
    plan.deletes.par_iter().try_for_each(|path| -> Result<()> {
        let full = path.to_fs_path(&target);
        match std::fs::remove_file(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::from(e))
                .with_context(|| format!("Failed to delete: {}", full.display())),
        }
    })?;
    summary.deleted = plan.deletes.len();

    // 2. Remove directories (deepest-first - already ordered)
    for path in plan.rmdirs.iter().filter(|p| !p.is_root()) {
        let full = path.to_fs_path(&target);
        match std::fs::remove_dir(&full) {
            Ok(()) => summary.dirs_removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(anyhow::Error::from(e))
                    .with_context(|| format!("Failed to remove directory: {}", full.display()))
            }
        }
    }

    // 3. Create directories (parent-first - already ordered)
    for path in &plan.mkdirs {
        let full = path.to_fs_path(&target);
        std::fs::create_dir_all(&full)
            .with_context(|| format!("Failed to create directory: {}", full.display()))?;
        summary.dirs_created += 1;
    }

    // 4. Downloads, in parallel. Paths are distinct map keys.
    let downloads: Vec<_> = plan.downloads.iter().collect();
    downloads
        .par_iter()
        .try_for_each(|(path, download)| -> Result<()> {
            let full = path.to_fs_path(&target);
            if download.source.is_bad() {
                bail!("No download source for {}", path);
            }
            if download.source.compression != Compression::Raw {
                bail!(
                    "Unsupported compression {:?} for {}",
                    download.source.compression,
                    path
                );
            }

            let data = fetcher
                .fetch(download)
                .with_context(|| format!("Failed to fetch {}", path))?;
            fetch::verify(&download.source, &data)?;

            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)?;
            }
            write_file(&full, &data, download.executable)?;
            debug!(%path, bytes = data.len(), "downloaded");
            Ok(())
        })?;
    summary.files_downloaded = plan.downloads.len();
    summary.bytes_downloaded = plan.downloads.values().map(|d| d.source.size).sum();

    // 5. Links
    for (path, link_target) in &plan.mklinks {
        create_link(&path.to_fs_path(&target), link_target)?;
        summary.links_created += 1;
    }

    // 6. Permission fixes
    for (path, executable) in &plan.executable_fixes {
        util::set_executable(&path.to_fs_path(&target), *executable)?;
        summary.permissions_fixed += 1;
    }

    info!(?summary, "update plan applied");
    Ok(summary)
}

/// Write `data` next to `full` and rename it into place, so an interrupted
/// apply never leaves a truncated file under the final name.
fn write_file(full: &Path, data: &[u8], executable: bool) -> Result<()> {
    let mut part = full.as_os_str().to_os_string();
    part.push(PART_SUFFIX);
    let part = PathBuf::from(part);

    std::fs::write(&part, data)
        .with_context(|| format!("Failed to write file: {}", part.display()))?;
    util::set_executable(&part, executable)?;
    std::fs::rename(&part, full)
        .with_context(|| format!("Failed to move {} into place", full.display()))
}

#[cfg(unix)]
fn create_link(full: &Path, link_target: &TreePath) -> Result<()> {
    std::os::unix::fs::symlink(link_target.to_string(), full)
        .with_context(|| format!("Failed to create link: {} -> {}", full.display(), link_target))
}

#[cfg(not(unix))]
fn create_link(full: &Path, link_target: &TreePath) -> Result<()> {
    bail!(
        "Symbolic links are not supported on this platform: {} -> {}",
        full.display(),
        link_target
    )
}
