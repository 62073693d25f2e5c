use bytes::Bytes;

use crate::error::FsError;
use crate::linked_data::{Cid, Link};
use crate::node::{FileInput, Metadata, Node, NodeKind, SkeletonInfo};
use crate::store::BlockStore;

use super::PublicHeader;

/// A plaintext file. The header references the raw userland blob;
/// large content streams through the store without being buffered.
#[derive(Debug, Clone)]
pub struct PublicFile {
    store: BlockStore,
    name: String,
    cid: Option<Cid>,
    metadata: Metadata,
    metadata_cid: Option<Cid>,
    previous: Option<Cid>,
    merge: Option<Cid>,
    userland: Option<Cid>,
    size: u64,
}

impl PublicFile {
    pub fn new(store: BlockStore, name: impl Into<String>) -> Self {
        PublicFile {
            store,
            name: name.into(),
            cid: None,
            metadata: Metadata::new_file(),
            metadata_cid: None,
            previous: None,
            merge: None,
            userland: None,
            size: 0,
        }
    }

    pub(super) fn from_parts(
        store: BlockStore,
        name: impl Into<String>,
        cid: Cid,
        header: PublicHeader,
        metadata: Metadata,
    ) -> Self {
        PublicFile {
            store,
            name: name.into(),
            cid: Some(cid),
            metadata,
            metadata_cid: Some(header.metadata),
            previous: header.previous,
            merge: header.merge,
            userland: Some(header.userland),
            size: header.size,
        }
    }

    /// Load a file node; fails with `NotAFile` if the CID holds a tree
    pub async fn load(
        store: BlockStore,
        name: impl Into<String>,
        cid: Cid,
    ) -> Result<Self, FsError> {
        let name = name.into();
        match super::PublicNode::load(store, name.clone(), cid).await? {
            super::PublicNode::File(file) => Ok(file),
            super::PublicNode::Tree(_) => Err(FsError::NotAFile(name)),
        }
    }

    /// Replace the file content, writing userland blocks immediately
    pub async fn set_content(&mut self, content: FileInput) -> Result<(), FsError> {
        let (userland, size) = self.store.put_stream(content.into_stream()).await?;
        self.userland = Some(userland);
        self.size = size;
        Ok(())
    }

    /// Read the whole userland into memory
    pub async fn content(&self) -> Result<Bytes, FsError> {
        let userland = self
            .userland
            .ok_or_else(|| FsError::NotFound(format!("{} has no content", self.name)))?;
        Ok(self.store.get(&userland).await?)
    }

    /// Stream the userland without materializing it
    pub async fn content_reader(
        &self,
    ) -> Result<iroh_blobs::api::blobs::BlobReader, FsError> {
        let userland = self
            .userland
            .ok_or_else(|| FsError::NotFound(format!("{} has no content", self.name)))?;
        Ok(self.store.get_reader(&userland).await?)
    }

    pub fn userland(&self) -> Option<Cid> {
        self.userland
    }

    pub fn merge_pointer(&self) -> Option<Cid> {
        self.merge
    }

    pub(crate) fn set_merge_pointer(&mut self, merge: Option<Cid>) {
        self.merge = merge;
    }

    /// Persist this version: a fresh metadata block, then the header
    /// linking it, `previous` pointing at the version this one
    /// supersedes. Returns the link a parent should hold.
    pub async fn put(&mut self, commit: bool) -> Result<Link, FsError> {
        let userland = self
            .userland
            .ok_or_else(|| FsError::NotFound(format!("{} has no content", self.name)))?;

        self.metadata = self.metadata.updated();
        let metadata_cid = self.store.put_node(&self.metadata, commit).await?;

        let header = PublicHeader {
            kind: NodeKind::File,
            metadata: metadata_cid,
            previous: self.cid,
            merge: self.merge.take(),
            skeleton: None,
            userland,
            size: self.size,
        };
        let cid = self.store.put_node(&header, commit).await?;
        tracing::debug!("put public file {} at {}", self.name, cid);

        self.previous = self.cid;
        self.cid = Some(cid);
        self.metadata_cid = Some(metadata_cid);

        self.to_link()
    }

    pub fn to_link(&self) -> Result<Link, FsError> {
        let cid = self
            .cid
            .ok_or_else(|| FsError::NotFound(format!("{} has not been persisted", self.name)))?;
        Ok(Link::new(self.name.clone(), cid, self.size, true))
    }

    pub fn skeleton_info(&self) -> Result<SkeletonInfo, FsError> {
        let cid = self
            .cid
            .ok_or_else(|| FsError::NotFound(format!("{} has not been persisted", self.name)))?;
        let userland = self
            .userland
            .ok_or_else(|| FsError::NotFound(format!("{} has no content", self.name)))?;
        let metadata = self
            .metadata_cid
            .ok_or_else(|| FsError::NotFound(format!("{} has no metadata block", self.name)))?;
        Ok(SkeletonInfo::file(cid, userland, metadata))
    }
}

impl Node for PublicFile {
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
        self.previous
    }

    fn size(&self) -> u64 {
        self.size
    }
}
