use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crypto::{Key, Namefilter, PrivateName, Ratchet};
use crate::error::FsError;
use crate::linked_data::{BlockEncoded, Cid, LD_RAW_CODEC};
use crate::node::{FileInput, Metadata, Node, Skeleton, SkeletonInfo};
use crate::store::BlockStore;

use super::file::PrivateFile;
use super::{Backlink, PrivateBlock, PrivateForest, PrivateLink, PrivateNode, PrivateNodeHeader};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateTreeBlock {
    pub header: PrivateNodeHeader,
    pub metadata: Metadata,
    pub previous: Option<Backlink>,
    pub merge: Option<Backlink>,
    pub links: BTreeMap<String, PrivateLink>,
    pub skeleton: Skeleton,
    pub size: u64,
}

/// An encrypted directory. The link table and skeleton live inside
/// the encrypted block; child links carry the exact ciphertext CID
/// and the ratchet the decryption key derives from, while the forest
/// indexes every generation by private name for root resolution.
#[derive(Debug, Clone)]
pub struct PrivateTree {
    store: BlockStore,
    name: String,
    cid: Option<Cid>,
    header: PrivateNodeHeader,
    metadata: Metadata,
    previous: Option<Backlink>,
    merge: Option<Backlink>,
    links: BTreeMap<String, PrivateLink>,
    skeleton: Skeleton,
    size: u64,
}

impl PrivateTree {
    /// A new empty directory under the given parent filter
    pub fn new(store: BlockStore, name: impl Into<String>, parent_bare: &Namefilter) -> Self {
        PrivateTree {
            store,
            name: name.into(),
            cid: None,
            header: PrivateNodeHeader::new(parent_bare),
            metadata: Metadata::new_dir(),
            previous: None,
            merge: None,
            links: BTreeMap::new(),
            skeleton: Skeleton::new(),
            size: 0,
        }
    }

    pub(super) fn from_parts(
        store: BlockStore,
        name: impl Into<String>,
        cid: Cid,
        block: PrivateTreeBlock,
    ) -> Self {
        PrivateTree {
            store,
            name: name.into(),
            cid: Some(cid),
            header: block.header,
            metadata: block.metadata,
            previous: block.previous,
            merge: block.merge,
            links: block.links,
            skeleton: block.skeleton,
            size: block.size,
        }
    }

    /// Open a root tree from externally persisted state: its private
    /// name and the symmetric key for the current generation.
    pub async fn load_root(
        store: BlockStore,
        forest: &PrivateForest,
        name: impl Into<String>,
        private_name: &PrivateName,
        key: &Key,
    ) -> Result<Self, FsError> {
        let name = name.into();
        let cid = forest
            .get(private_name)
            .ok_or_else(|| FsError::NotFound(format!("private root {}", name)))?;
        let ciphertext = store.get(&cid).await?;
        let plaintext = key
            .decrypt(&ciphertext)
            .map_err(|_| FsError::DecryptionFailed(name.clone()))?;
        let block = PrivateBlock::decode(&plaintext).map_err(|_| FsError::CorruptBlock(cid))?;
        match block {
            PrivateBlock::Tree(block) => Ok(Self::from_parts(store, name, cid, block)),
            PrivateBlock::File(_) => Err(FsError::NotADirectory(name)),
        }
    }

    pub fn ratchet(&self) -> &Ratchet {
        &self.header.ratchet
    }

    pub fn bare_name(&self) -> &Namefilter {
        &self.header.bare_name
    }

    pub fn private_name(&self) -> PrivateName {
        self.header.private_name()
    }

    pub fn key(&self) -> Key {
        self.header.ratchet.key()
    }

    pub fn links(&self) -> &BTreeMap<String, PrivateLink> {
        &self.links
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn previous_backlink(&self) -> Option<&Backlink> {
        self.previous.as_ref()
    }

    pub(crate) fn set_merge_backlink(&mut self, merge: Option<Backlink>) {
        self.merge = merge;
    }

    pub(crate) fn store(&self) -> &BlockStore {
        &self.store
    }

    /// Swap in a merged link table and skeleton (merge commits only)
    pub(crate) fn replace_children(
        &mut self,
        links: BTreeMap<String, PrivateLink>,
        skeleton: Skeleton,
    ) {
        self.links = links;
        self.skeleton = skeleton;
    }

    /// Resolve a path to a node. An empty path resolves to this tree.
    pub async fn get(&self, path: &[String]) -> Result<PrivateNode, FsError> {
        let (head, rest) = match path.split_first() {
            None => return Ok(PrivateNode::Tree(self.clone())),
            Some(parts) => parts,
        };
        let link = self
            .links
            .get(head)
            .ok_or_else(|| FsError::NotFound(head.clone()))?;
        let node = PrivateNode::load(self.store.clone(), head.clone(), link).await?;
        if rest.is_empty() {
            return Ok(node);
        }
        match node {
            PrivateNode::Tree(tree) => Box::pin(tree.get(rest)).await,
            PrivateNode::File(_) => Err(FsError::NotADirectory(head.clone())),
        }
    }

    /// Write file content at a path, creating intermediate directories
    pub async fn write(
        &mut self,
        forest: &mut PrivateForest,
        path: &[String],
        content: FileInput,
        commit: bool,
    ) -> Result<PrivateLink, FsError> {
        let (head, rest) = path
            .split_first()
            .ok_or_else(|| FsError::InvalidPath("write requires a file path".to_string()))?;

        if rest.is_empty() {
            let mut file = match self.links.get(head) {
                Some(link) if link.is_file => {
                    match PrivateNode::load(self.store.clone(), head.clone(), link).await? {
                        PrivateNode::File(file) => file,
                        PrivateNode::Tree(_) => return Err(FsError::NotAFile(head.clone())),
                    }
                }
                Some(_) => return Err(FsError::NotAFile(head.clone())),
                None => PrivateFile::new(self.store.clone(), head.clone(), &self.header.bare_name),
            };
            let link = file.put(forest, Some(content), commit).await?;
            self.skeleton.insert(head.clone(), file.skeleton_info()?);
            self.links.insert(head.clone(), link);
        } else {
            let mut child = self.child_tree_or_new(head).await?;
            let link = Box::pin(child.write(forest, rest, content, commit)).await?;
            self.skeleton.insert(head.clone(), child.skeleton_info()?);
            self.links.insert(head.clone(), link);
        }

        self.put(forest, commit).await
    }

    /// Create a directory at a path, creating missing intermediates
    pub async fn mkdir(
        &mut self,
        forest: &mut PrivateForest,
        path: &[String],
        commit: bool,
    ) -> Result<PrivateLink, FsError> {
        let (head, rest) = path
            .split_first()
            .ok_or_else(|| FsError::InvalidPath("mkdir requires a path".to_string()))?;

        if rest.is_empty() {
            match self.links.get(head) {
                Some(link) if link.is_file => return Err(FsError::NotADirectory(head.clone())),
                Some(_) => {
                    return Err(anyhow::anyhow!("directory already exists: {}", head).into());
                }
                None => {
                    let mut child =
                        PrivateTree::new(self.store.clone(), head.clone(), &self.header.bare_name);
                    let link = child.put(forest, commit).await?;
                    self.skeleton.insert(head.clone(), child.skeleton_info()?);
                    self.links.insert(head.clone(), link);
                }
            }
        } else {
            let mut child = self.child_tree_or_new(head).await?;
            let link = Box::pin(child.mkdir(forest, rest, commit)).await?;
            self.skeleton.insert(head.clone(), child.skeleton_info()?);
            self.links.insert(head.clone(), link);
        }

        self.put(forest, commit).await
    }

    /// Remove the link at a path from its immediate parent
    pub async fn rm(
        &mut self,
        forest: &mut PrivateForest,
        path: &[String],
        commit: bool,
    ) -> Result<PrivateLink, FsError> {
        let (head, rest) = path
            .split_first()
            .ok_or_else(|| FsError::InvalidPath("rm requires a path".to_string()))?;

        if rest.is_empty() {
            if self.links.remove(head).is_none() {
                return Err(FsError::NotFound(head.clone()));
            }
            self.skeleton.remove(head);
        } else {
            let link = self
                .links
                .get(head)
                .ok_or_else(|| FsError::NotFound(head.clone()))?;
            if link.is_file {
                return Err(FsError::NotADirectory(head.clone()));
            }
            let mut child =
                match PrivateNode::load(self.store.clone(), head.clone(), link).await? {
                    PrivateNode::Tree(tree) => tree,
                    PrivateNode::File(_) => return Err(FsError::NotADirectory(head.clone())),
                };
            let new_link = Box::pin(child.rm(forest, rest, commit)).await?;
            self.skeleton.insert(head.clone(), child.skeleton_info()?);
            self.links.insert(head.clone(), new_link);
        }

        self.put(forest, commit).await
    }

    /// Splice an existing private link in at a path, creating missing
    /// intermediate directories. Fails if the destination name is
    /// taken.
    pub async fn graft(
        &mut self,
        forest: &mut PrivateForest,
        path: &[String],
        link: PrivateLink,
        info: SkeletonInfo,
        commit: bool,
    ) -> Result<PrivateLink, FsError> {
        let (head, rest) = path
            .split_first()
            .ok_or_else(|| FsError::InvalidPath("graft requires a path".to_string()))?;

        if rest.is_empty() {
            if self.links.contains_key(head) {
                return Err(anyhow::anyhow!("destination already exists: {}", head).into());
            }
            self.skeleton.insert(head.clone(), info);
            self.links.insert(head.clone(), link);
        } else {
            let mut child = self.child_tree_or_new(head).await?;
            let child_link = Box::pin(child.graft(forest, rest, link, info, commit)).await?;
            self.skeleton.insert(head.clone(), child.skeleton_info()?);
            self.links.insert(head.clone(), child_link);
        }

        self.put(forest, commit).await
    }

    async fn child_tree_or_new(&self, name: &str) -> Result<PrivateTree, FsError> {
        match self.links.get(name) {
            Some(link) if !link.is_file => {
                match PrivateNode::load(self.store.clone(), name, link).await? {
                    PrivateNode::Tree(tree) => Ok(tree),
                    PrivateNode::File(_) => Err(FsError::NotADirectory(name.to_string())),
                }
            }
            Some(_) => Err(FsError::NotADirectory(name.to_string())),
            None => Ok(PrivateTree::new(
                self.store.clone(),
                name,
                &self.header.bare_name,
            )),
        }
    }

    /// Persist the next generation of this directory: advance the
    /// ratchet past the prior version, seal the block under the new
    /// key, and index it under the re-derived name.
    pub async fn put(
        &mut self,
        forest: &mut PrivateForest,
        commit: bool,
    ) -> Result<PrivateLink, FsError> {
        if let Some(cid) = self.cid {
            self.previous = Some(Backlink {
                cid,
                ratchet: self.header.ratchet.clone(),
            });
            self.header.ratchet.inc();
        }

        self.metadata = self.metadata.updated();
        self.size = self.links.values().map(|l| l.size).sum();

        let block = PrivateBlock::Tree(PrivateTreeBlock {
            header: self.header.clone(),
            metadata: self.metadata.clone(),
            previous: self.previous.clone(),
            merge: self.merge.take(),
            links: self.links.clone(),
            skeleton: self.skeleton.clone(),
            size: self.size,
        });
        let key = self.header.ratchet.key();
        let ciphertext = key.encrypt(&block.encode()?)?;
        let cid = self.store.put_block(LD_RAW_CODEC, ciphertext, commit).await?;
        tracing::debug!("put private tree {} at {}", self.name, cid);

        let name = self.header.private_name();
        forest.insert(name.clone(), cid);
        self.cid = Some(cid);

        Ok(PrivateLink {
            ratchet: self.header.ratchet.clone(),
            name,
            cid,
            size: self.size,
            is_file: false,
        })
    }

    pub fn skeleton_info(&self) -> Result<SkeletonInfo, FsError> {
        let cid = self
            .cid
            .ok_or_else(|| FsError::NotFound(format!("{} has not been persisted", self.name)))?;
        Ok(SkeletonInfo::tree(cid, cid, cid, self.skeleton.clone()))
    }
}

impl Node for PrivateTree {
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
