/**
 * History traversal over previous-version links.
 * Every node carries a pointer to the version it superseded;
 *  walking the chain yields generations newest-first, ending at
 *  a node with no predecessor. Chains may be sparse if pruned
 *  externally; ordering stays monotone either way.
 */
use crate::crypto::{Key, PrivateName};
use crate::error::FsError;
use crate::linked_data::Cid;
use crate::node::{Metadata, Node};
use crate::private::{Backlink, PrivateNode};
use crate::public::PublicHeader;
use crate::store::BlockStore;

/// Upper bound on any history walk, guarding against cycles in
/// corrupted stores
pub const HISTORY_HORIZON: usize = 1 << 16;

/// One generation of a node. Private entries carry the key and name
/// that generation was stored under; public entries leave them unset.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub cid: Cid,
    pub key: Option<Key>,
    pub private_name: Option<PrivateName>,
    pub metadata: Metadata,
    pub size: u64,
}

/// Walk a public node's previous chain, newest first. `limit` bounds
/// the number of generations returned; `-1` walks to the beginning.
pub async fn public_history(
    store: &BlockStore,
    cid: Cid,
    limit: i64,
) -> Result<Vec<HistoryEntry>, FsError> {
    let mut entries = Vec::new();
    let mut next = Some(cid);

    while let Some(cid) = next {
        if (limit >= 0 && entries.len() as i64 >= limit) || entries.len() >= HISTORY_HORIZON {
            break;
        }
        let header: PublicHeader = store.get_node(&cid).await?;
        let metadata: Metadata = store.get_node(&header.metadata).await?;
        entries.push(HistoryEntry {
            cid,
            key: None,
            private_name: None,
            metadata,
            size: header.size,
        });
        next = header.previous;
    }

    Ok(entries)
}

/// CIDs of a public node's chain, newest first, bounded by `max`
pub async fn public_chain(
    store: &BlockStore,
    cid: Cid,
    max: usize,
) -> Result<Vec<Cid>, FsError> {
    let mut cids = Vec::new();
    let mut next = Some(cid);
    while let Some(cid) = next {
        if cids.len() >= max {
            break;
        }
        cids.push(cid);
        let header: PublicHeader = store.get_node(&cid).await?;
        next = header.previous;
    }
    Ok(cids)
}

/// Walk a private node's backlink chain, newest first. Each entry
/// exposes the generation's key and private name, so an auditor
/// holding the current node can resolve and decrypt its whole past.
pub async fn private_history(
    store: &BlockStore,
    node: &PrivateNode,
    limit: i64,
) -> Result<Vec<HistoryEntry>, FsError> {
    let name = node.name().to_string();
    let mut entries = Vec::new();
    let mut current = node.clone();

    loop {
        if (limit >= 0 && entries.len() as i64 >= limit) || entries.len() >= HISTORY_HORIZON {
            break;
        }
        let cid = current
            .cid()
            .ok_or_else(|| FsError::NotFound(format!("{} has not been persisted", name)))?;
        entries.push(HistoryEntry {
            cid,
            key: Some(current.ratchet().key()),
            private_name: Some(current.private_name()),
            metadata: current.metadata().clone(),
            size: current.size(),
        });
        match current.previous_backlink().cloned() {
            Some(backlink) => {
                current = PrivateNode::load_backlink(store.clone(), name.clone(), &backlink).await?;
            }
            None => break,
        }
    }

    Ok(entries)
}

/// Backlinks of a private node's chain, newest first (the head entry
/// is the node itself). The ratchet in each backlink is what lets the
/// merge walk decrypt ancestor generations.
pub async fn private_chain(
    store: &BlockStore,
    node: &PrivateNode,
    max: usize,
) -> Result<Vec<Backlink>, FsError> {
    let name = node.name().to_string();
    let mut chain = Vec::new();
    let head_cid = node
        .cid()
        .ok_or_else(|| FsError::NotFound(format!("{} has not been persisted", name)))?;
    chain.push(Backlink {
        cid: head_cid,
        ratchet: node.ratchet().clone(),
    });

    let mut current = node.clone();
    while chain.len() < max {
        match current.previous_backlink().cloned() {
            Some(backlink) => {
                chain.push(backlink.clone());
                current =
                    PrivateNode::load_backlink(store.clone(), name.clone(), &backlink).await?;
            }
            None => break,
        }
    }

    Ok(chain)
}
