use std::fmt;
use std::str::FromStr;

use crate::error::FsError;

/// Name of the plaintext subtree under the root
pub const PUBLIC_ROOT: &str = "public";
/// Name of the encrypted subtree under the root
pub const PRIVATE_ROOT: &str = "private";

/// A slash-separated path inside the filesystem. The first segment
/// selects the public or private subtree; the empty path is the root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    pub fn root() -> Self {
        Path::default()
    }

    /// Parse a path, rejecting empty, relative, or traversal segments
    pub fn parse(raw: &str) -> Result<Self, FsError> {
        let mut segments = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" => continue,
                "." | ".." => {
                    return Err(FsError::InvalidPath(raw.to_string()));
                }
                name => segments.push(name.to_string()),
            }
        }
        Ok(Path { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Split into the subtree selector and the remaining segments
    pub fn split_root(&self) -> Result<(&str, &[String]), FsError> {
        match self.segments.split_first() {
            Some((head, rest)) if head == PUBLIC_ROOT || head == PRIVATE_ROOT => {
                Ok((head.as_str(), rest))
            }
            _ => Err(FsError::InvalidPath(format!(
                "{} (paths start with {}/ or {}/)",
                self, PUBLIC_ROOT, PRIVATE_ROOT
            ))),
        }
    }

    pub fn parent(&self) -> Option<Path> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Path {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn basename(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn join(&self, name: &str) -> Path {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Path { segments }
    }

    /// Whether `self` is `prefix` or lies underneath it
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl FromStr for Path {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}
