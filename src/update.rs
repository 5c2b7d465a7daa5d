use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::package::Package;
use crate::path::{deep_first, shallow_first, TreePath};
use crate::source::FileDownload;

/// Filesystem operations turning one [`Package`] into another.
///
/// Categories must be applied in this order: `deletes`, `rmdirs` (already
/// deepest-first), `mkdirs` (already shallowest-first), `downloads`,
/// `mklinks`, `executable_fixes`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOperations {
    pub valid: bool,
    pub deletes: Vec<TreePath>,
    pub rmdirs: Vec<TreePath>,
    pub mkdirs: Vec<TreePath>,
    pub downloads: BTreeMap<TreePath, FileDownload>,
    pub mklinks: BTreeMap<TreePath, TreePath>,
    pub executable_fixes: BTreeMap<TreePath, bool>,
}

/// Counts per operation category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub deletes: usize,
    pub rmdirs: usize,
    pub mkdirs: usize,
    pub downloads: usize,
    pub download_bytes: u64,
    pub mklinks: usize,
    pub executable_fixes: usize,
}

/// A single operation of a plan, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStep<'a> {
    Delete(&'a TreePath),
    RemoveDir(&'a TreePath),
    CreateDir(&'a TreePath),
    Download(&'a TreePath, &'a FileDownload),
    Link(&'a TreePath, &'a TreePath),
    SetExecutable(&'a TreePath, bool),
}

impl UpdateOperations {
    /// Compute the operations transforming `from` into `to`.
    ///
    /// Content changes are delete + download, link changes are delete +
    /// relink. A permission-only change becomes an executable fix. If either
    /// side is invalid the result is invalid and empty.
    pub fn resolve(from: &Package, to: &Package) -> Self {
        if !from.valid || !to.valid {
            debug!(
                from_valid = from.valid,
                to_valid = to.valid,
                "refusing to diff an invalid package"
            );
            return Self::default();
        }

        let mut out = Self {
            valid: true,
            ..Self::default()
        };

        // Files
        for (path, current) in &from.files {
            match to.files.get(path) {
                None => out.deletes.push(path.clone()),
                Some(wanted) if wanted.hash != current.hash => {
                    out.deletes.push(path.clone());
                    out.downloads.insert(path.clone(), to.download_for(wanted));
                }
                Some(wanted) if wanted.executable != current.executable => {
                    out.executable_fixes.insert(path.clone(), wanted.executable);
                }
                Some(_) => {}
            }
        }
        for (path, wanted) in &to.files {
            if !from.files.contains_key(path) {
                out.downloads.insert(path.clone(), to.download_for(wanted));
            }
        }

        // Folders
        out.rmdirs = from.folders.difference(&to.folders).cloned().collect();
        out.rmdirs.sort_by(deep_first);
        out.mkdirs = to.folders.difference(&from.folders).cloned().collect();
        out.mkdirs.sort_by(shallow_first);

        // Symlinks
        for (path, current) in &from.symlinks {
            match to.symlinks.get(path) {
                None => out.deletes.push(path.clone()),
                Some(wanted) if wanted != current => {
                    out.deletes.push(path.clone());
                    out.mklinks.insert(path.clone(), wanted.clone());
                }
                Some(_) => {}
            }
        }
        for (path, wanted) in &to.symlinks {
            if !from.symlinks.contains_key(path) {
                out.mklinks.insert(path.clone(), wanted.clone());
            }
        }

        debug!(summary = ?out.summary(), "resolved update");
        out
    }

    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty()
            && self.rmdirs.is_empty()
            && self.mkdirs.is_empty()
            && self.downloads.is_empty()
            && self.mklinks.is_empty()
            && self.executable_fixes.is_empty()
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            deletes: self.deletes.len(),
            rmdirs: self.rmdirs.len(),
            mkdirs: self.mkdirs.len(),
            downloads: self.downloads.len(),
            download_bytes: self.downloads.values().map(|d| d.source.size).sum(),
            mklinks: self.mklinks.len(),
            executable_fixes: self.executable_fixes.len(),
        }
    }

    /// Every operation, in the order it has to be applied.
    pub fn steps(&self) -> impl Iterator<Item = PlanStep<'_>> {
        self.deletes
            .iter()
            .map(PlanStep::Delete)
            .chain(self.rmdirs.iter().map(PlanStep::RemoveDir))
            .chain(self.mkdirs.iter().map(PlanStep::CreateDir))
            .chain(self.downloads.iter().map(|(p, d)| PlanStep::Download(p, d)))
            .chain(self.mklinks.iter().map(|(p, t)| PlanStep::Link(p, t)))
            .chain(
                self.executable_fixes
                    .iter()
                    .map(|(p, x)| PlanStep::SetExecutable(p, *x)),
            )
    }

    /// Every path the plan touches, link targets excluded.
    pub fn touched_paths(&self) -> impl Iterator<Item = &TreePath> {
        self.deletes
            .iter()
            .chain(&self.rmdirs)
            .chain(&self.mkdirs)
            .chain(self.downloads.keys())
            .chain(self.mklinks.keys())
            .chain(self.executable_fixes.keys())
    }
}

impl fmt::Display for PlanStep<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanStep::Delete(p) => write!(f, "delete  {p}"),
            PlanStep::RemoveDir(p) => write!(f, "rmdir   {p}"),
            PlanStep::CreateDir(p) => write!(f, "mkdir   {p}"),
            PlanStep::Download(p, d) => write!(
                f,
                "fetch   {p} <- {} ({} bytes, {:?}{})",
                d.source.url,
                d.source.size,
                d.source.compression,
                if d.executable { ", executable" } else { "" }
            ),
            PlanStep::Link(p, t) => write!(f, "link    {p} -> {t}"),
            PlanStep::SetExecutable(p, x) => write!(f, "chmod   {p} {}", if *x { "+x" } else { "-x" }),
        }
    }
}
