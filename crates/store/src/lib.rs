/**
 * Hash-addressed blob persistence.
 *  A light wrapper around iroh-blobs stores, exposing the
 *  handful of operations the filesystem core needs: put
 *  bytes or a stream, get bytes or a reader, and check
 *  whether a blob is present.
 * Blobs are keyed by the BLAKE3 hash of their content.
 *  Codec and node concerns live a layer up, in grove-fs.
 */
use std::future::IntoFuture;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use bytes::Bytes;
use futures::Stream;
use iroh_blobs::{
    api::blobs::{BlobReader as Reader, BlobStatus, Blobs},
    store::{fs::FsStore, mem::MemStore},
    BlobsProtocol, Hash,
};

#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    #[error("blob store error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("blob store i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Client over a local iroh-blobs store.
///  All durable state of a grove filesystem lives here as
///  content-addressed blobs: node headers, metadata, skeletons,
///  link tables, private ciphertext, and raw file bytes.
#[derive(Clone, Debug)]
pub struct BlobStore {
    pub inner: Arc<BlobsProtocol>,
}

impl Deref for BlobStore {
    type Target = Arc<BlobsProtocol>;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl BlobStore {
    /// Load a filesystem-backed blob store at the given path,
    ///  creating it if absent.
    pub async fn fs(path: &Path) -> Result<Self, BlobStoreError> {
        tracing::debug!("BlobStore::fs called with path: {:?}", path);
        let store = FsStore::load(path).await?;
        let blobs = BlobsProtocol::new(&store, None);
        Ok(Self {
            inner: Arc::new(blobs),
        })
    }

    /// Load an in-memory blob store
    pub async fn memory() -> Result<Self, BlobStoreError> {
        let store = MemStore::new();
        let blobs = BlobsProtocol::new(&store, None);
        Ok(Self {
            inner: Arc::new(blobs),
        })
    }

    /// Get a handle to the underlying blobs client against
    ///  the store
    pub fn blobs(&self) -> &Blobs {
        self.inner.store().blobs()
    }

    /// Get a blob as bytes
    pub async fn get(&self, hash: &Hash) -> Result<Bytes, BlobStoreError> {
        let bytes = self.blobs().get_bytes(*hash).await.map_err(anyhow::Error::from)?;
        Ok(bytes)
    }

    /// Get a blob from the store as a reader
    pub async fn get_reader(&self, hash: Hash) -> Result<Reader, BlobStoreError> {
        let reader = self.blobs().reader(hash);
        Ok(reader)
    }

    /// Store a stream of bytes as a blob
    pub async fn put_stream(
        &self,
        stream: impl Stream<Item = std::io::Result<Bytes>> + Send + Unpin + 'static + std::marker::Sync,
    ) -> Result<Hash, BlobStoreError> {
        let outcome = self
            .blobs()
            .add_stream(stream)
            .into_future()
            .await
            .with_tag()
            .await
            .map_err(anyhow::Error::from)?
            .hash;
        Ok(outcome)
    }

    /// Store a vec of bytes as a blob
    pub async fn put(&self, data: Vec<u8>) -> Result<Hash, BlobStoreError> {
        let hash = self
            .blobs()
            .add_bytes(data)
            .into_future()
            .await
            .map_err(anyhow::Error::from)?
            .hash;
        Ok(hash)
    }

    /// Whether a complete blob with this hash is present
    pub async fn stat(&self, hash: &Hash) -> Result<bool, BlobStoreError> {
        let stat = self
            .blobs()
            .status(*hash)
            .await
            .map_err(|err| BlobStoreError::Default(anyhow!(err)))?;
        Ok(matches!(stat, BlobStatus::Complete { .. }))
    }

    /// Size in bytes of a complete blob, if present
    pub async fn size(&self, hash: &Hash) -> Result<Option<u64>, BlobStoreError> {
        let stat = self
            .blobs()
            .status(*hash)
            .await
            .map_err(|err| BlobStoreError::Default(anyhow!(err)))?;
        match stat {
            BlobStatus::Complete { size } => Ok(Some(size)),
            _ => Ok(None),
        }
    }
}
