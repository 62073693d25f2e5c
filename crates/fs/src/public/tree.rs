use futures::try_join;

use crate::error::FsError;
use crate::linked_data::{Cid, Link, LinkBlock, Links};
use crate::node::{
    FileInput, Metadata, Node, NodeKind, Skeleton, SkeletonBlock, SkeletonInfo,
};
use crate::store::BlockStore;

use super::file::PublicFile;
use super::{PublicHeader, PublicNode};

/// A plaintext directory. Userland is the link table; the skeleton
/// block mirrors the whole subtree shape. Mutations recurse to the
/// target and rewrite every node on the way back up, each new version
/// linking its predecessor.
#[derive(Debug, Clone)]
pub struct PublicTree {
    store: BlockStore,
    name: String,
    cid: Option<Cid>,
    metadata: Metadata,
    metadata_cid: Option<Cid>,
    previous: Option<Cid>,
    merge: Option<Cid>,
    userland_cid: Option<Cid>,
    links: Links,
    skeleton: Skeleton,
    size: u64,
}

impl PublicTree {
    pub fn new(store: BlockStore, name: impl Into<String>) -> Self {
        PublicTree {
            store,
            name: name.into(),
            cid: None,
            metadata: Metadata::new_dir(),
            metadata_cid: None,
            previous: None,
            merge: None,
            userland_cid: None,
            links: Links::new(),
            skeleton: Skeleton::new(),
            size: 0,
        }
    }

    pub(super) async fn from_parts(
        store: BlockStore,
        name: impl Into<String>,
        cid: Cid,
        header: PublicHeader,
        metadata: Metadata,
    ) -> Result<Self, FsError> {
        let skeleton_cid = header.skeleton.ok_or(FsError::CorruptBlock(cid))?;
        let (userland, skeleton) = try_join!(
            store.get_node::<LinkBlock>(&header.userland),
            store.get_node::<SkeletonBlock>(&skeleton_cid),
        )?;
        Ok(PublicTree {
            store,
            name: name.into(),
            cid: Some(cid),
            metadata,
            metadata_cid: Some(header.metadata),
            previous: header.previous,
            merge: header.merge,
            userland_cid: Some(header.userland),
            links: userland.links,
            skeleton: skeleton.skeleton,
            size: header.size,
        })
    }

    /// Load a tree node; fails with `NotADirectory` if the CID holds a file
    pub async fn load(
        store: BlockStore,
        name: impl Into<String>,
        cid: Cid,
    ) -> Result<Self, FsError> {
        let name = name.into();
        match PublicNode::load(store, name.clone(), cid).await? {
            PublicNode::Tree(tree) => Ok(tree),
            PublicNode::File(_) => Err(FsError::NotADirectory(name)),
        }
    }

    pub fn children(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn links(&self) -> &Links {
        &self.links
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn merge_pointer(&self) -> Option<Cid> {
        self.merge
    }

    pub(crate) fn set_merge_pointer(&mut self, merge: Option<Cid>) {
        self.merge = merge;
    }

    pub(crate) fn store(&self) -> &BlockStore {
        &self.store
    }

    /// Swap in a merged link table and skeleton (merge commits only)
    pub(crate) fn replace_children(&mut self, links: Links, skeleton: Skeleton) {
        self.links = links;
        self.skeleton = skeleton;
    }

    /// Resolve a path to a node. An empty path resolves to this tree.
    pub async fn get(&self, path: &[String]) -> Result<PublicNode, FsError> {
        let (head, rest) = match path.split_first() {
            None => return Ok(PublicNode::Tree(self.clone())),
            Some(parts) => parts,
        };
        let link = self
            .links
            .get(head)
            .ok_or_else(|| FsError::NotFound(head.clone()))?;
        let node = PublicNode::load(self.store.clone(), head.clone(), link.cid).await?;
        if rest.is_empty() {
            return Ok(node);
        }
        match node {
            PublicNode::Tree(tree) => Box::pin(tree.get(rest)).await,
            PublicNode::File(_) => Err(FsError::NotADirectory(head.clone())),
        }
    }

    /// Write file content at a path, creating intermediate directories.
    /// Overwrites an existing file; fails with `NotAFile` if a
    /// directory sits at the target.
    pub async fn write(
        &mut self,
        path: &[String],
        content: FileInput,
        commit: bool,
    ) -> Result<Link, FsError> {
        let (head, rest) = path
            .split_first()
            .ok_or_else(|| FsError::InvalidPath("write requires a file path".to_string()))?;

        if rest.is_empty() {
            let mut file = match self.links.get(head) {
                Some(link) if link.is_file => {
                    PublicFile::load(self.store.clone(), head.clone(), link.cid).await?
                }
                Some(_) => return Err(FsError::NotAFile(head.clone())),
                None => PublicFile::new(self.store.clone(), head.clone()),
            };
            file.set_content(content).await?;
            let link = file.put(commit).await?;
            self.skeleton.insert(head.clone(), file.skeleton_info()?);
            self.links.insert(head.clone(), link);
        } else {
            let mut child = self.child_tree_or_new(head).await?;
            let link = Box::pin(child.write(rest, content, commit)).await?;
            self.skeleton.insert(head.clone(), child.skeleton_info()?);
            self.links.insert(head.clone(), link);
        }

        self.put(commit).await
    }

    /// Create a directory at a path, creating missing intermediates.
    /// Fails if a file sits anywhere on the path, or if the target
    /// directory already exists.
    pub async fn mkdir(&mut self, path: &[String], commit: bool) -> Result<Link, FsError> {
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
                    let mut child = PublicTree::new(self.store.clone(), head.clone());
                    let link = child.put(commit).await?;
                    self.skeleton.insert(head.clone(), child.skeleton_info()?);
                    self.links.insert(head.clone(), link);
                }
            }
        } else {
            let mut child = self.child_tree_or_new(head).await?;
            let link = Box::pin(child.mkdir(rest, commit)).await?;
            self.skeleton.insert(head.clone(), child.skeleton_info()?);
            self.links.insert(head.clone(), link);
        }

        self.put(commit).await
    }

    /// Remove the link at a path from its immediate parent. The
    /// removed subtree's blocks remain in the store for history.
    pub async fn rm(&mut self, path: &[String], commit: bool) -> Result<Link, FsError> {
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
            let mut child = PublicTree::load(self.store.clone(), head.clone(), link.cid).await?;
            let new_link = Box::pin(child.rm(rest, commit)).await?;
            self.skeleton.insert(head.clone(), child.skeleton_info()?);
            self.links.insert(head.clone(), new_link);
        }

        self.put(commit).await
    }

    /// Splice an existing link (and its skeleton summary) in at a
    /// path, creating missing intermediate directories. Fails if the
    /// destination name is taken.
    pub async fn graft(
        &mut self,
        path: &[String],
        link: Link,
        info: SkeletonInfo,
        commit: bool,
    ) -> Result<Link, FsError> {
        let (head, rest) = path
            .split_first()
            .ok_or_else(|| FsError::InvalidPath("graft requires a path".to_string()))?;

        if rest.is_empty() {
            if self.links.contains_key(head) {
                return Err(anyhow::anyhow!("destination already exists: {}", head).into());
            }
            let mut link = link;
            link.name = head.clone();
            self.skeleton.insert(head.clone(), info);
            self.links.insert(head.clone(), link);
        } else {
            let mut child = self.child_tree_or_new(head).await?;
            let child_link = Box::pin(child.graft(rest, link, info, commit)).await?;
            self.skeleton.insert(head.clone(), child.skeleton_info()?);
            self.links.insert(head.clone(), child_link);
        }

        self.put(commit).await
    }

    async fn child_tree_or_new(&self, name: &str) -> Result<PublicTree, FsError> {
        match self.links.get(name) {
            Some(link) if !link.is_file => {
                PublicTree::load(self.store.clone(), name, link.cid).await
            }
            Some(_) => Err(FsError::NotADirectory(name.to_string())),
            None => Ok(PublicTree::new(self.store.clone(), name)),
        }
    }

    /// Persist this version. Metadata, skeleton, and userland blocks
    /// have no data dependency on each other and are written
    /// concurrently; the header is written last so every CID it
    /// references already exists.
    pub async fn put(&mut self, commit: bool) -> Result<Link, FsError> {
        self.metadata = self.metadata.updated();
        let userland = LinkBlock {
            links: self.links.clone(),
        };
        let skeleton = SkeletonBlock {
            skeleton: self.skeleton.clone(),
        };

        let (metadata_cid, userland_cid, skeleton_cid) = try_join!(
            self.store.put_node(&self.metadata, commit),
            self.store.put_node(&userland, commit),
            self.store.put_node(&skeleton, commit),
        )?;

        let size = self.links.values().map(|l| l.size).sum();
        let header = PublicHeader {
            kind: NodeKind::Tree,
            metadata: metadata_cid,
            previous: self.cid,
            merge: self.merge.take(),
            skeleton: Some(skeleton_cid),
            userland: userland_cid,
            size,
        };
        let cid = self.store.put_node(&header, commit).await?;
        tracing::debug!("put public tree {} at {}", self.name, cid);

        self.previous = self.cid;
        self.cid = Some(cid);
        self.metadata_cid = Some(metadata_cid);
        self.userland_cid = Some(userland_cid);
        self.size = size;

        self.to_link()
    }

    pub fn to_link(&self) -> Result<Link, FsError> {
        let cid = self
            .cid
            .ok_or_else(|| FsError::NotFound(format!("{} has not been persisted", self.name)))?;
        Ok(Link::new(self.name.clone(), cid, self.size, false))
    }

    pub fn skeleton_info(&self) -> Result<SkeletonInfo, FsError> {
        let cid = self
            .cid
            .ok_or_else(|| FsError::NotFound(format!("{} has not been persisted", self.name)))?;
        let userland = self
            .userland_cid
            .ok_or_else(|| FsError::NotFound(format!("{} has no userland block", self.name)))?;
        let metadata = self
            .metadata_cid
            .ok_or_else(|| FsError::NotFound(format!("{} has no metadata block", self.name)))?;
        Ok(SkeletonInfo::tree(
            cid,
            userland,
            metadata,
            self.skeleton.clone(),
        ))
    }
}

impl Node for PublicTree {
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
