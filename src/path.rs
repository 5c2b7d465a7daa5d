use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A normalized, `/`-separated path inside a package tree.
///
/// Construction drops empty and `.` segments and resolves `..` against the
/// preceding segment. A `..` with nothing left to pop is kept, so relative
/// link targets like `../lib/foo.so` survive intact. A leading `/` is kept as
/// well, so `/etc/hostname` and `etc/hostname` stay distinct link targets.
/// Both kinds point outside the tree and are reported by
/// [`TreePath::is_escaping`].
///
/// The relative path with zero segments is the tree root and renders as `.`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TreePath {
    segments: Vec<String>,
    absolute: bool,
}

impl TreePath {
    /// The tree root.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new(raw: &str) -> Self {
        let absolute = raw.starts_with('/');
        let mut segments: Vec<String> = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => {}
                ".." => match segments.last().map(String::as_str) {
                    Some(last) if last != ".." => {
                        segments.pop();
                    }
                    // "/.." is "/"
                    None if absolute => {}
                    _ => segments.push("..".to_string()),
                },
                other => segments.push(other.to_string()),
            }
        }
        Self { segments, absolute }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty() && !self.absolute
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// True for every path except the root.
    pub fn has_parent_path(&self) -> bool {
        !self.segments.is_empty()
    }

    /// The path with its last segment removed. The root is its own parent.
    pub fn parent_path(&self) -> Self {
        let mut segments = self.segments.clone();
        segments.pop();
        Self {
            segments,
            absolute: self.absolute,
        }
    }

    /// Number of segments; the root has depth 0.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// True when the path is absolute or starts with `..`, and so leaves the tree.
    pub fn is_escaping(&self) -> bool {
        self.absolute || self.segments.first().is_some_and(|s| s == "..")
    }

    /// Resolve this path below a real directory. Only meaningful for paths
    /// that do not escape.
    pub fn to_fs_path(&self, base: &std::path::Path) -> std::path::PathBuf {
        let mut out = base.to_path_buf();
        for segment in &self.segments {
            out.push(segment);
        }
        out
    }
}

/// Parents before children: depth ascending, then lexicographic.
pub fn shallow_first(lhs: &TreePath, rhs: &TreePath) -> Ordering {
    lhs.depth().cmp(&rhs.depth()).then_with(|| lhs.cmp(rhs))
}

/// Children before parents: depth descending, then lexicographic.
pub fn deep_first(lhs: &TreePath, rhs: &TreePath) -> Ordering {
    rhs.depth().cmp(&lhs.depth()).then_with(|| lhs.cmp(rhs))
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.absolute, self.segments.is_empty()) {
            (false, true) => f.write_str("."),
            (false, false) => f.write_str(&self.segments.join("/")),
            (true, _) => write!(f, "/{}", self.segments.join("/")),
        }
    }
}

impl From<&str> for TreePath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for TreePath {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<TreePath> for String {
    fn from(path: TreePath) -> Self {
        path.to_string()
    }
}
