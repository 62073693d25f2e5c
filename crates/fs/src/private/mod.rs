/**
 * The encrypted subtree.
 * A private node serializes to a single block — metadata, link
 *  table or chunk list, and its own ratchet state inside — which
 *  is encrypted with the ratchet's key for the node's current
 *  generation and indexed in the forest under a bloom-filter name.
 *  An observer of the store sees uniform ciphertext under
 *  unlinkable names; nothing ties two generations of the same
 *  logical path together.
 * Every mutation advances the touched nodes' ratchets by one
 *  generation, re-deriving names and keys, so superseded keys
 *  cannot be computed from current ones.
 */
mod file;
mod forest;
mod tree;

use serde::{Deserialize, Serialize};

use crate::crypto::{Namefilter, PrivateName, Ratchet};
use crate::error::FsError;
use crate::linked_data::{BlockEncoded, Cid};
use crate::node::{Metadata, Node};
use crate::store::BlockStore;

pub use file::{PrivateFile, PrivateFileBlock, CHUNK_SIZE};
pub use forest::PrivateForest;
pub use tree::{PrivateTree, PrivateTreeBlock};

/// A parent's edge to a private child. Carries the child's ratchet
/// state — the decryption key is derived, never stored — along with
/// the exact ciphertext CID and the private name the generation is
/// indexed under in the forest. Traversal resolves by CID; the name
/// is what outside observers and the root lookup go through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateLink {
    pub ratchet: Ratchet,
    pub name: PrivateName,
    pub cid: Cid,
    pub size: u64,
    pub is_file: bool,
}

/// An edge to an earlier generation of the same node: the ciphertext
/// CID plus the ratchet state that generation was encrypted under.
/// Stored inside the encrypted block, so history is readable exactly
/// by holders of the current node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backlink {
    pub cid: Cid,
    pub ratchet: Ratchet,
}

/// Plaintext layout of a private node block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PrivateBlock {
    File(file::PrivateFileBlock),
    Tree(tree::PrivateTreeBlock),
}

impl BlockEncoded for PrivateBlock {}

/// A loaded private node of either variant.
#[derive(Debug, Clone)]
pub enum PrivateNode {
    File(PrivateFile),
    Tree(PrivateTree),
}

impl PrivateNode {
    /// Resolve a parent link: fetch the ciphertext and decrypt it
    /// with the link's ratchet key.
    pub async fn load(
        store: BlockStore,
        name: impl Into<String>,
        link: &PrivateLink,
    ) -> Result<Self, FsError> {
        Self::load_ciphertext(store, name.into(), link.cid, &link.ratchet).await
    }

    /// Load an earlier generation through its backlink.
    pub async fn load_backlink(
        store: BlockStore,
        name: impl Into<String>,
        backlink: &Backlink,
    ) -> Result<Self, FsError> {
        Self::load_ciphertext(store, name.into(), backlink.cid, &backlink.ratchet).await
    }

    async fn load_ciphertext(
        store: BlockStore,
        name: String,
        cid: Cid,
        ratchet: &Ratchet,
    ) -> Result<Self, FsError> {
        let ciphertext = store.get(&cid).await?;
        let plaintext = ratchet
            .key()
            .decrypt(&ciphertext)
            .map_err(|_| FsError::DecryptionFailed(name.clone()))?;
        let block = PrivateBlock::decode(&plaintext).map_err(|_| FsError::CorruptBlock(cid))?;
        Ok(match block {
            PrivateBlock::File(block) => {
                PrivateNode::File(PrivateFile::from_parts(store, name, cid, block))
            }
            PrivateBlock::Tree(block) => {
                PrivateNode::Tree(PrivateTree::from_parts(store, name, cid, block))
            }
        })
    }

    pub fn as_file(&self) -> Option<&PrivateFile> {
        match self {
            PrivateNode::File(file) => Some(file),
            PrivateNode::Tree(_) => None,
        }
    }

    pub fn as_tree(&self) -> Option<&PrivateTree> {
        match self {
            PrivateNode::File(_) => None,
            PrivateNode::Tree(tree) => Some(tree),
        }
    }

    pub fn into_tree(self) -> Option<PrivateTree> {
        match self {
            PrivateNode::File(_) => None,
            PrivateNode::Tree(tree) => Some(tree),
        }
    }

    pub fn previous_backlink(&self) -> Option<&Backlink> {
        match self {
            PrivateNode::File(file) => file.previous_backlink(),
            PrivateNode::Tree(tree) => tree.previous_backlink(),
        }
    }

    pub fn ratchet(&self) -> &Ratchet {
        match self {
            PrivateNode::File(file) => file.ratchet(),
            PrivateNode::Tree(tree) => tree.ratchet(),
        }
    }

    pub fn private_name(&self) -> PrivateName {
        match self {
            PrivateNode::File(file) => file.private_name(),
            PrivateNode::Tree(tree) => tree.private_name(),
        }
    }
}

impl Node for PrivateNode {
    fn cid(&self) -> Option<Cid> {
        match self {
            PrivateNode::File(file) => file.cid(),
            PrivateNode::Tree(tree) => tree.cid(),
        }
    }

    fn name(&self) -> &str {
        match self {
            PrivateNode::File(file) => file.name(),
            PrivateNode::Tree(tree) => tree.name(),
        }
    }

    fn metadata(&self) -> &Metadata {
        match self {
            PrivateNode::File(file) => file.metadata(),
            PrivateNode::Tree(tree) => tree.metadata(),
        }
    }

    fn previous(&self) -> Option<Cid> {
        match self {
            PrivateNode::File(file) => file.previous(),
            PrivateNode::Tree(tree) => tree.previous(),
        }
    }

    fn size(&self) -> u64 {
        match self {
            PrivateNode::File(file) => file.size(),
            PrivateNode::Tree(tree) => tree.size(),
        }
    }
}

/// Identity material shared by both private variants: a random
/// inumber naming the logical node across generations, the bare
/// namefilter accumulating ancestry, and the ratchet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateNodeHeader {
    pub inumber: [u8; 32],
    pub bare_name: Namefilter,
    pub ratchet: Ratchet,
}

impl PrivateNodeHeader {
    /// Fresh identity for a new child of the given parent
    pub fn new(parent_bare: &Namefilter) -> Self {
        let mut inumber = [0u8; 32];
        getrandom::getrandom(&mut inumber).expect("failed to generate random bytes");
        let mut bare_name = parent_bare.clone();
        bare_name.add(&inumber);
        PrivateNodeHeader {
            inumber,
            bare_name,
            ratchet: Ratchet::new(),
        }
    }

    /// The store index name at the current generation
    pub fn private_name(&self) -> PrivateName {
        self.bare_name.name(&self.ratchet.name_seed())
    }
}
