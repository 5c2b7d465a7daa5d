use serde::{Deserialize, Serialize};

/// Transport encoding of a downloadable blob.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Raw,
    Lzma,
    #[default]
    Unknown,
}

impl Compression {
    /// Map a manifest `downloads` key to a compression method.
    pub fn from_key(key: &str) -> Self {
        match key {
            "raw" => Compression::Raw,
            "lzma" => Compression::Lzma,
            _ => Compression::Unknown,
        }
    }
}

/// One way to obtain the bytes of a file: where to fetch them and what the
/// fetched blob hashes to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSource {
    pub compression: Compression,
    pub hash: String,
    pub url: String,
    pub size: u64,
}

impl FileSource {
    /// No usable transport was found.
    pub fn is_bad(&self) -> bool {
        self.compression == Compression::Unknown
    }

    /// Replace `self` with `other` when `self` is bad or `other` is larger.
    ///
    /// The larger blob is taken to be the one closest to the raw bytes.
    pub fn upgrade(&mut self, other: FileSource) {
        if self.is_bad() || other.size > self.size {
            *self = other;
        }
    }
}

/// A source plus the permission the written file must end up with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDownload {
    pub source: FileSource,
    pub executable: bool,
}

impl FileDownload {
    pub fn new(source: FileSource, executable: bool) -> Self {
        Self { source, executable }
    }
}
