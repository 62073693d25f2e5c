use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::crypto::{Namefilter, PrivateName, Ratchet};
use crate::error::FsError;
use crate::linked_data::{BlockEncoded, Cid, LD_RAW_CODEC};
use crate::node::{FileInput, Metadata, Node, SkeletonInfo};
use crate::store::BlockStore;

use super::{Backlink, PrivateBlock, PrivateForest, PrivateLink, PrivateNodeHeader};

/// Userland segment size for private files. Each chunk is encrypted
/// and stored on its own, so content streams through without being
/// materialized.
pub const CHUNK_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateFileBlock {
    pub header: PrivateNodeHeader,
    pub metadata: Metadata,
    pub previous: Option<Backlink>,
    pub merge: Option<Backlink>,
    pub chunks: Vec<Cid>,
    pub size: u64,
}

/// An encrypted file. The node block carries the chunk list inline;
/// chunks are separately stored ciphertext under the same generation
/// key.
#[derive(Debug, Clone)]
pub struct PrivateFile {
    store: BlockStore,
    name: String,
    cid: Option<Cid>,
    header: PrivateNodeHeader,
    metadata: Metadata,
    previous: Option<Backlink>,
    merge: Option<Backlink>,
    chunks: Vec<Cid>,
    size: u64,
}

impl PrivateFile {
    pub fn new(store: BlockStore, name: impl Into<String>, parent_bare: &Namefilter) -> Self {
        PrivateFile {
            store,
            name: name.into(),
            cid: None,
            header: PrivateNodeHeader::new(parent_bare),
            metadata: Metadata::new_file(),
            previous: None,
            merge: None,
            chunks: Vec::new(),
            size: 0,
        }
    }

    pub(super) fn from_parts(
        store: BlockStore,
        name: impl Into<String>,
        cid: Cid,
        block: PrivateFileBlock,
    ) -> Self {
        PrivateFile {
            store,
            name: name.into(),
            cid: Some(cid),
            header: block.header,
            metadata: block.metadata,
            previous: block.previous,
            merge: block.merge,
            chunks: block.chunks,
            size: block.size,
        }
    }

    pub fn ratchet(&self) -> &Ratchet {
        &self.header.ratchet
    }

    pub fn private_name(&self) -> PrivateName {
        self.header.private_name()
    }

    pub fn previous_backlink(&self) -> Option<&Backlink> {
        self.previous.as_ref()
    }

    pub(crate) fn set_merge_backlink(&mut self, merge: Option<Backlink>) {
        self.merge = merge;
    }

    /// Read and decrypt the whole userland
    pub async fn content(&self) -> Result<Bytes, FsError> {
        let key = self.header.ratchet.key();
        let mut out = Vec::with_capacity(self.size as usize);
        for cid in &self.chunks {
            let ciphertext = self.store.get(cid).await?;
            let plaintext = key
                .decrypt(&ciphertext)
                .map_err(|_| FsError::DecryptionFailed(self.name.clone()))?;
            out.extend_from_slice(&plaintext);
        }
        Ok(out.into())
    }

    /// Persist the next generation of this file, replacing its content
    /// when `content` is given.
    ///
    /// Advances the ratchet by one generation if a prior version
    /// exists, records it as a backlink, re-encrypts chunks and node
    /// block under the new key, and indexes the ciphertext in the
    /// forest under the re-derived name.
    pub async fn put(
        &mut self,
        forest: &mut PrivateForest,
        content: Option<FileInput>,
        commit: bool,
    ) -> Result<PrivateLink, FsError> {
        let backlink = match self.cid {
            Some(cid) => {
                let prior = Backlink {
                    cid,
                    ratchet: self.header.ratchet.clone(),
                };
                self.header.ratchet.inc();
                Some(prior)
            }
            None => None,
        };
        if let Some(prior) = backlink {
            self.previous = Some(prior);
        }

        let key = self.header.ratchet.key();

        if let Some(content) = content {
            let mut stream = content.into_stream();
            let mut pending: Vec<u8> = Vec::with_capacity(CHUNK_SIZE);
            let mut chunks = Vec::new();
            let mut size: u64 = 0;

            while let Some(piece) = stream.next().await {
                let piece = piece?;
                size += piece.len() as u64;
                pending.extend_from_slice(&piece);
                while pending.len() >= CHUNK_SIZE {
                    let rest = pending.split_off(CHUNK_SIZE);
                    let chunk = std::mem::replace(&mut pending, rest);
                    let ciphertext = key.encrypt(&chunk)?;
                    chunks.push(self.store.put(ciphertext).await?);
                }
            }
            if !pending.is_empty() {
                let ciphertext = key.encrypt(&pending)?;
                chunks.push(self.store.put(ciphertext).await?);
            }

            self.chunks = chunks;
            self.size = size;
        } else {
            // content carries over; re-seal it under the new key
            let mut resealed = Vec::with_capacity(self.chunks.len());
            if let Some(prior) = &self.previous {
                let old_key = prior.ratchet.key();
                for cid in &self.chunks {
                    let ciphertext = self.store.get(cid).await?;
                    let plaintext = old_key
                        .decrypt(&ciphertext)
                        .map_err(|_| FsError::DecryptionFailed(self.name.clone()))?;
                    resealed.push(self.store.put(key.encrypt(&plaintext)?).await?);
                }
                self.chunks = resealed;
            }
        }

        self.metadata = self.metadata.updated();

        let block = PrivateBlock::File(PrivateFileBlock {
            header: self.header.clone(),
            metadata: self.metadata.clone(),
            previous: self.previous.clone(),
            merge: self.merge.take(),
            chunks: self.chunks.clone(),
            size: self.size,
        });
        let ciphertext = key.encrypt(&block.encode()?)?;
        let cid = self.store.put_block(LD_RAW_CODEC, ciphertext, commit).await?;
        tracing::debug!("put private file {} at {}", self.name, cid);

        let name = self.header.private_name();
        forest.insert(name.clone(), cid);
        self.cid = Some(cid);

        Ok(PrivateLink {
            ratchet: self.header.ratchet.clone(),
            name,
            cid,
            size: self.size,
            is_file: true,
        })
    }

    /// Skeleton summary of this node. Userland and metadata live inside
    /// the ciphertext block, so all three pointers are the node itself.
    pub fn skeleton_info(&self) -> Result<SkeletonInfo, FsError> {
        let cid = self
            .cid
            .ok_or_else(|| FsError::NotFound(format!("{} has not been persisted", self.name)))?;
        Ok(SkeletonInfo::file(cid, cid, cid))
    }
}

impl Node for PrivateFile {
    fn cid(&self) -> Option<Cid> {
        self.cid
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn previous(&self) -> Option<Cid> {
        self.previous.as_ref().map(|b| b.cid)
    }

    fn size(&self) -> u64 {
        self.size
    }
}
