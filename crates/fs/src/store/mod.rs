/**
 * Storage layer for the filesystem core.
 *  `BlockStore` is the CID-keyed facade over the hash-addressed
 *  blob store: it encodes structured nodes to DAG-CBOR blocks,
 *  distinguishes a missing block from a corrupt one, and can
 *  compute a block's CID without persisting it (uncommitted
 *  mutations).
 */
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use grove_store::{BlobStore, BlobStoreError};
use iroh_blobs::api::blobs::BlobReader;
use iroh_blobs::Hash;

use crate::linked_data::{BlockEncoded, Cid, CidError, CodecError, LD_DAG_CBOR_CODEC};

#[derive(Debug, thiserror::Error)]
pub enum BlockStoreError {
    #[error("block not found: {0}")]
    NotFound(Cid),
    #[error("corrupt block: {0}")]
    CorruptBlock(Cid),
    #[error("cid error: {0}")]
    Cid(#[from] CidError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("store error: {0}")]
    Store(#[from] BlobStoreError),
}

/// Content-addressed block storage, the core's sole persistence
/// dependency. Writes are durable before `put` returns; reads are
/// linearizable with preceding writes in this process.
#[derive(Clone, Debug)]
pub struct BlockStore {
    blobs: BlobStore,
}

impl BlockStore {
    /// Open a filesystem-backed store at the given path
    pub async fn fs(path: &Path) -> Result<Self, BlockStoreError> {
        Ok(Self {
            blobs: BlobStore::fs(path).await?,
        })
    }

    /// Open an in-memory store
    pub async fn memory() -> Result<Self, BlockStoreError> {
        Ok(Self {
            blobs: BlobStore::memory().await?,
        })
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Store raw bytes under the given codec. With `commit` unset the
    /// CID is computed locally and nothing is written; spine rewrites
    /// use this to build uncommitted states.
    pub async fn put_block(
        &self,
        codec: u64,
        bytes: Vec<u8>,
        commit: bool,
    ) -> Result<Cid, BlockStoreError> {
        let hash = if commit {
            self.blobs.put(bytes).await?
        } else {
            Hash::new(&bytes)
        };
        Ok(Cid::new(codec, hash))
    }

    /// Store raw bytes, returning a raw-codec CID
    pub async fn put(&self, bytes: Vec<u8>) -> Result<Cid, BlockStoreError> {
        let hash = self.blobs.put(bytes).await?;
        Ok(Cid::raw(hash))
    }

    /// Store a stream of bytes as a single raw blob, returning its CID
    /// and total length
    pub async fn put_stream(
        &self,
        stream: impl Stream<Item = std::io::Result<Bytes>> + Send + Sync + Unpin + 'static,
    ) -> Result<(Cid, u64), BlockStoreError> {
        let written = Arc::new(AtomicU64::new(0));
        let counter = written.clone();
        let counted = stream.map(move |chunk| {
            if let Ok(bytes) = &chunk {
                counter.fetch_add(bytes.len() as u64, Ordering::Relaxed);
            }
            chunk
        });
        let hash = self.blobs.put_stream(Box::pin(counted)).await?;
        Ok((Cid::raw(hash), written.load(Ordering::Relaxed)))
    }

    /// Get a block's bytes. Fails with `NotFound` if the store has no
    /// complete blob for this CID.
    pub async fn get(&self, cid: &Cid) -> Result<Bytes, BlockStoreError> {
        let hash = cid.hash()?;
        if !self.blobs.stat(&hash).await? {
            tracing::debug!("block {} not found in store", cid);
            return Err(BlockStoreError::NotFound(*cid));
        }
        Ok(self.blobs.get(&hash).await?)
    }

    /// Get a streaming reader over a block's bytes
    pub async fn get_reader(&self, cid: &Cid) -> Result<BlobReader, BlockStoreError> {
        let hash = cid.hash()?;
        if !self.blobs.stat(&hash).await? {
            return Err(BlockStoreError::NotFound(*cid));
        }
        Ok(self.blobs.get_reader(hash).await?)
    }

    /// Serialize a structured node and store it as a DAG-CBOR block
    pub async fn put_node<T: BlockEncoded>(
        &self,
        node: &T,
        commit: bool,
    ) -> Result<Cid, BlockStoreError> {
        let bytes = node.encode()?;
        self.put_block(LD_DAG_CBOR_CODEC, bytes, commit).await
    }

    /// Fetch and decode a structured node. A block that is present but
    /// fails to decode surfaces as `CorruptBlock`.
    pub async fn get_node<T: BlockEncoded>(&self, cid: &Cid) -> Result<T, BlockStoreError> {
        let bytes = self.get(cid).await?;
        T::decode(&bytes).map_err(|err| {
            tracing::debug!("block {} failed to decode: {}", cid, err);
            BlockStoreError::CorruptBlock(*cid)
        })
    }

    /// Whether a complete block with this CID is present
    pub async fn has(&self, cid: &Cid) -> Result<bool, BlockStoreError> {
        Ok(self.blobs.stat(&cid.hash()?).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestNode {
        name: String,
        count: u64,
    }

    impl BlockEncoded for TestNode {}

    #[tokio::test]
    async fn test_put_get_node() {
        let store = BlockStore::memory().await.unwrap();

        let node = TestNode {
            name: "example".to_string(),
            count: 42,
        };

        let cid = store.put_node(&node, true).await.unwrap();
        let loaded: TestNode = store.get_node(&cid).await.unwrap();

        assert_eq!(node, loaded);
    }

    #[tokio::test]
    async fn test_uncommitted_put_computes_same_cid() {
        let store = BlockStore::memory().await.unwrap();

        let node = TestNode {
            name: "dry run".to_string(),
            count: 7,
        };

        let dry = store.put_node(&node, false).await.unwrap();
        assert!(!store.has(&dry).await.unwrap());

        let committed = store.put_node(&node, true).await.unwrap();
        assert_eq!(dry, committed);
        assert!(store.has(&committed).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = BlockStore::memory().await.unwrap();

        let cid = Cid::raw(Hash::new(b"never stored"));
        let err = store.get(&cid).await.unwrap_err();

        assert!(matches!(err, BlockStoreError::NotFound(c) if c == cid));
    }

    #[tokio::test]
    async fn test_garbage_block_is_corrupt() {
        let store = BlockStore::memory().await.unwrap();

        let cid = store.put(b"not cbor at all \xff\xff".to_vec()).await.unwrap();
        let err = store.get_node::<TestNode>(&cid).await.unwrap_err();

        assert!(matches!(err, BlockStoreError::CorruptBlock(c) if c == cid));
    }

    #[tokio::test]
    async fn test_put_stream_counts_bytes() {
        let store = BlockStore::memory().await.unwrap();

        let chunks: Vec<std::io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ];
        let stream = futures::stream::iter(chunks);

        let (cid, size) = store.put_stream(Box::pin(stream)).await.unwrap();
        assert_eq!(size, 11);
        assert_eq!(store.get(&cid).await.unwrap().as_ref(), b"hello world");
    }
}
