/**
 * The plaintext subtree.
 * Public nodes are structurally transparent: a header block
 *  references separately addressed metadata, skeleton, and
 *  userland blocks, so shape queries never touch file bytes.
 * Every mutation rebuilds the spine above it, each new node
 *  linking the prior version of itself through `previous`.
 */
mod file;
mod tree;

use serde::{Deserialize, Serialize};

use crate::error::FsError;
use crate::linked_data::{BlockEncoded, Cid};
use crate::node::{Metadata, Node, NodeKind};
use crate::store::BlockStore;

pub use file::PublicFile;
pub use tree::PublicTree;

/// Header block shared by both public variants. Files carry no
/// skeleton link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicHeader {
    pub kind: NodeKind,
    pub metadata: Cid,
    pub previous: Option<Cid>,
    pub merge: Option<Cid>,
    pub skeleton: Option<Cid>,
    pub userland: Cid,
    pub size: u64,
}

impl BlockEncoded for PublicHeader {}

/// A loaded public node of either variant.
#[derive(Debug, Clone)]
pub enum PublicNode {
    File(PublicFile),
    Tree(PublicTree),
}

impl PublicNode {
    /// Load a node by CID, dispatching on the header's kind tag.
    pub async fn load(
        store: BlockStore,
        name: impl Into<String>,
        cid: Cid,
    ) -> Result<Self, FsError> {
        let header: PublicHeader = store.get_node(&cid).await?;
        let metadata: Metadata = store.get_node(&header.metadata).await?;
        match header.kind {
            NodeKind::File => Ok(PublicNode::File(PublicFile::from_parts(
                store, name, cid, header, metadata,
            ))),
            NodeKind::Tree => Ok(PublicNode::Tree(
                PublicTree::from_parts(store, name, cid, header, metadata).await?,
            )),
        }
    }

    pub fn as_file(&self) -> Option<&PublicFile> {
        match self {
            PublicNode::File(file) => Some(file),
            PublicNode::Tree(_) => None,
        }
    }

    pub fn as_tree(&self) -> Option<&PublicTree> {
        match self {
            PublicNode::File(_) => None,
            PublicNode::Tree(tree) => Some(tree),
        }
    }

    pub fn into_file(self) -> Option<PublicFile> {
        match self {
            PublicNode::File(file) => Some(file),
            PublicNode::Tree(_) => None,
        }
    }

    pub fn into_tree(self) -> Option<PublicTree> {
        match self {
            PublicNode::File(_) => None,
            PublicNode::Tree(tree) => Some(tree),
        }
    }
}

impl Node for PublicNode {
    fn cid(&self) -> Option<Cid> {
        match self {
            PublicNode::File(file) => file.cid(),
            PublicNode::Tree(tree) => tree.cid(),
        }
    }

    fn name(&self) -> &str {
        match self {
            PublicNode::File(file) => file.name(),
            PublicNode::Tree(tree) => tree.name(),
        }
    }

    fn metadata(&self) -> &Metadata {
        match self {
            PublicNode::File(file) => file.metadata(),
            PublicNode::Tree(tree) => tree.metadata(),
        }
    }

    fn previous(&self) -> Option<Cid> {
        match self {
            PublicNode::File(file) => file.previous(),
            PublicNode::Tree(tree) => tree.previous(),
        }
    }

    fn size(&self) -> u64 {
        match self {
            PublicNode::File(file) => file.size(),
            PublicNode::Tree(tree) => tree.size(),
        }
    }
}
