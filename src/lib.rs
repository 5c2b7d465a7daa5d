//! Content-addressed file tree manifests and update plans.
//!
//! A [`Package`] describes a directory tree: folders, files identified by
//! their SHA-1, symlinks, and the sources files can be downloaded from. It is
//! built from a JSON manifest (the wanted state) or by inspecting a folder
//! (the current state). [`UpdateOperations::resolve`] diffs two packages into
//! an ordered plan, which [`apply`] can execute against a real directory.

pub mod apply;
pub mod fetch;
pub mod inspect;
pub mod logging;
pub mod manifest;
pub mod package;
pub mod path;
pub mod plan_format;
pub mod source;
pub mod update;
pub mod util;

pub use apply::ApplySummary;
pub use fetch::{Fetcher, MirrorFetcher};
pub use inspect::InspectError;
pub use manifest::ManifestError;
pub use package::{File, Package};
pub use path::TreePath;
pub use source::{Compression, FileDownload, FileSource};
pub use update::{PlanStep, PlanSummary, UpdateOperations};
