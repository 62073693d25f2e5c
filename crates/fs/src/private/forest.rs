use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crypto::PrivateName;
use crate::error::FsError;
use crate::linked_data::{BlockEncoded, Cid};
use crate::store::BlockStore;

/// The on-disk forest block. Keys are base64 private names, for CBOR
/// map-key compatibility.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
struct ForestBlock {
    entries: BTreeMap<String, Cid>,
}

impl BlockEncoded for ForestBlock {}

/// Index of every private node generation, keyed by private name.
///
/// The forest is how private nodes are found without revealing
/// structure: names are saturated namefilters, values are ciphertext
/// CIDs. Entries accrete — superseded generations stay resolvable for
/// history until an external GC intervenes.
#[derive(Debug, Clone)]
pub struct PrivateForest {
    store: BlockStore,
    cid: Option<Cid>,
    entries: BTreeMap<String, Cid>,
}

impl PrivateForest {
    pub fn new(store: BlockStore) -> Self {
        PrivateForest {
            store,
            cid: None,
            entries: BTreeMap::new(),
        }
    }

    pub async fn load(store: BlockStore, cid: Cid) -> Result<Self, FsError> {
        let block: ForestBlock = store.get_node(&cid).await?;
        Ok(PrivateForest {
            store,
            cid: Some(cid),
            entries: block.entries,
        })
    }

    pub fn cid(&self) -> Option<Cid> {
        self.cid
    }

    pub fn get(&self, name: &PrivateName) -> Option<Cid> {
        self.entries.get(&name.to_base64()).copied()
    }

    pub fn insert(&mut self, name: PrivateName, cid: Cid) {
        self.entries.insert(name.to_base64(), cid);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge another forest's entries in. Both sides' generations stay
    /// resolvable afterwards; on a (never expected) name collision the
    /// other side wins.
    pub fn absorb(&mut self, other: &PrivateForest) {
        for (name, cid) in &other.entries {
            self.entries.insert(name.clone(), *cid);
        }
    }

    pub async fn put(&mut self, commit: bool) -> Result<Cid, FsError> {
        let block = ForestBlock {
            entries: self.entries.clone(),
        };
        let cid = self.store.put_node(&block, commit).await?;
        tracing::debug!("put private forest ({} entries) at {}", self.entries.len(), cid);
        self.cid = Some(cid);
        Ok(cid)
    }
}
