use crate::crypto::KeyError;
use crate::linked_data::{Cid, CidError, CodecError};
use crate::store::BlockStoreError;

/// Errors surfaced by filesystem operations.
///
/// Every operation returns its outcome explicitly; nothing is
/// swallowed. Store failures are not retried here — retry policy
/// belongs to the caller.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("default error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("not a file: {0}")]
    NotAFile(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("no common history")]
    NoCommonHistory,
    #[error("merge type conflict at {0}: file on one side, directory on the other")]
    TypeConflict(String),
    #[error("decryption failed for private node {0}")]
    DecryptionFailed(String),
    #[error("corrupt block: {0}")]
    CorruptBlock(Cid),
    #[error("store error: {0}")]
    Store(BlockStoreError),
    #[error("cid error: {0}")]
    Cid(#[from] CidError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BlockStoreError> for FsError {
    fn from(err: BlockStoreError) -> Self {
        // corruption stays distinguishable however deep it surfaced
        match err {
            BlockStoreError::CorruptBlock(cid) => FsError::CorruptBlock(cid),
            other => FsError::Store(other),
        }
    }
}

impl From<KeyError> for FsError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::DecryptionFailed => FsError::DecryptionFailed("<unknown>".to_string()),
            KeyError::Default(inner) => FsError::Default(inner),
        }
    }
}
