/**
 * Shared node vocabulary.
 * Public and private, file and tree nodes all expose the
 *  same capability set through the `Node` trait; the
 *  concrete shapes live in the `public` and `private`
 *  modules.
 */
mod metadata;
mod path;
mod skeleton;

use bytes::Bytes;
use futures::{stream, Stream};
use serde::{Deserialize, Serialize};

use crate::linked_data::Cid;

pub use metadata::{Metadata, UnixMeta, FORMAT_VERSION};
pub use path::{Path, PRIVATE_ROOT, PUBLIC_ROOT};
pub use skeleton::{descend, Skeleton, SkeletonBlock, SkeletonInfo};

/// Discriminates file and tree headers on the wire, so a `previous`
/// link can be checked to reference a node of the same variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Tree,
}

/// Lazy source of file bytes
pub type ByteStream =
    Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync + Unpin + 'static>;

/// Content handed to a write: either in-memory bytes or a lazy
/// stream. Streams are consumed incrementally; whole files are never
/// materialized by the core.
pub enum FileInput {
    Bytes(Bytes),
    Stream(ByteStream),
}

impl FileInput {
    pub fn into_stream(self) -> ByteStream {
        match self {
            FileInput::Bytes(bytes) => {
                Box::new(stream::once(async move { Ok::<_, std::io::Error>(bytes) }))
            }
            FileInput::Stream(stream) => stream,
        }
    }
}

impl From<Bytes> for FileInput {
    fn from(bytes: Bytes) -> Self {
        FileInput::Bytes(bytes)
    }
}

impl From<Vec<u8>> for FileInput {
    fn from(bytes: Vec<u8>) -> Self {
        FileInput::Bytes(bytes.into())
    }
}

impl From<&[u8]> for FileInput {
    fn from(bytes: &[u8]) -> Self {
        FileInput::Bytes(Bytes::copy_from_slice(bytes))
    }
}

impl From<&str> for FileInput {
    fn from(text: &str) -> Self {
        FileInput::Bytes(Bytes::copy_from_slice(text.as_bytes()))
    }
}

impl From<ByteStream> for FileInput {
    fn from(stream: ByteStream) -> Self {
        FileInput::Stream(stream)
    }
}

/// The capability set every node variant exposes.
pub trait Node {
    /// CID of the most recently persisted version, if any
    fn cid(&self) -> Option<Cid>;
    /// Child name within the parent; empty for a root
    fn name(&self) -> &str;
    fn metadata(&self) -> &Metadata;
    /// CID of the previous version, when one exists
    fn previous(&self) -> Option<Cid>;
    fn size(&self) -> u64;

    fn is_file(&self) -> bool {
        self.metadata().is_file
    }
}
