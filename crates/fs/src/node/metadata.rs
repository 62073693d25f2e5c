use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::linked_data::BlockEncoded;

/// On-disk format version stamped into every metadata block
pub const FORMAT_VERSION: &str = "0.1.0";

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Unix-style file attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnixMeta {
    pub mtime: i64,
    pub ctime: i64,
    pub mode: u32,
}

impl UnixMeta {
    pub fn new(is_file: bool) -> Self {
        let now = unix_now();
        UnixMeta {
            mtime: now,
            ctime: now,
            mode: if is_file { 0o644 } else { 0o755 },
        }
    }
}

/// Per-node attributes. Stored as its own block for public nodes (so
/// it can be fetched without userland) and inline for private nodes.
/// A metadata block is never rewritten; each mutation writes a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub unix: UnixMeta,
    pub version: String,
    pub is_file: bool,
}

impl BlockEncoded for Metadata {}

impl Metadata {
    pub fn new(is_file: bool) -> Self {
        Metadata {
            unix: UnixMeta::new(is_file),
            version: FORMAT_VERSION.to_string(),
            is_file,
        }
    }

    pub fn new_file() -> Self {
        Self::new(true)
    }

    pub fn new_dir() -> Self {
        Self::new(false)
    }

    /// A copy with `mtime` refreshed, for the next version of the node
    pub fn updated(&self) -> Self {
        let mut next = self.clone();
        next.unix.mtime = unix_now();
        next
    }
}
