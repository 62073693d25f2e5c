/**
 * Three-way merge over divergent histories.
 * Two roots are first classified against each other's previous
 *  chains: identical, one ahead of the other, diverged, or
 *  unrelated. Diverged trees are merged directory by directory
 *  against their latest common ancestor; file collisions resolve
 *  deterministically by history depth, ties by CID. The merged
 *  node links both parents, so a merge is itself an auditable
 *  commit point.
 */
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::FsError;
use crate::history::{private_chain, public_chain, HISTORY_HORIZON};
use crate::linked_data::{Cid, Link, Links};
use crate::node::{Node, Skeleton};
use crate::private::{Backlink, PrivateForest, PrivateLink, PrivateNode, PrivateTree};
use crate::public::PublicTree;
use crate::store::BlockStore;

/// Bound on the ancestor search when classifying two histories
pub const MERGE_SEARCH_HORIZON: usize = HISTORY_HORIZON;

/// Outcome kind of a merge, mirroring distributed-VCS conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeType {
    /// Both roots are the same CID
    InSync,
    /// The remote root is already in local history
    LocalAhead,
    /// The local root is in remote history; remote is adopted
    FastForward,
    /// Histories diverged and were merged into a new commit
    MergeCommit,
}

/// How to resolve a file-versus-directory collision at the same name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// The side with the deeper history wins and the loser is
    /// discarded
    #[default]
    DeeperWins,
    /// Surface a `TypeConflict` error instead of choosing
    Fail,
}

/// Result of a completed merge
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub kind: MergeType,
    pub cid: Cid,
    pub size: u64,
    pub is_file: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct Divergence {
    pub lca: Cid,
    pub local_depth: usize,
    pub remote_depth: usize,
}

#[derive(Debug, Clone)]
pub(crate) enum SyncStatus {
    InSync,
    LocalAhead,
    RemoteAhead,
    Diverged(Divergence),
}

/// Classify two newest-first CID chains against each other. The
/// first remote CID found anywhere in the local chain is the latest
/// common ancestor; depth is each side's distance from its head.
pub(crate) fn classify(local: &[Cid], remote: &[Cid]) -> Result<SyncStatus, FsError> {
    let (l_head, r_head) = match (local.first(), remote.first()) {
        (Some(l), Some(r)) => (l, r),
        _ => return Err(FsError::NoCommonHistory),
    };
    if l_head == r_head {
        return Ok(SyncStatus::InSync);
    }

    let local_index: HashMap<Cid, usize> =
        local.iter().enumerate().map(|(i, c)| (*c, i)).collect();

    for (remote_depth, cid) in remote.iter().enumerate() {
        if let Some(&local_depth) = local_index.get(cid) {
            return Ok(if remote_depth == 0 {
                SyncStatus::LocalAhead
            } else if local_depth == 0 {
                SyncStatus::RemoteAhead
            } else {
                SyncStatus::Diverged(Divergence {
                    lca: *cid,
                    local_depth,
                    remote_depth,
                })
            });
        }
    }

    Err(FsError::NoCommonHistory)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Local,
    Remote,
}

/// Deterministic "longer history wins" rule; equal depths break to
/// the lexicographically greater CID
fn deeper_side(local_depth: usize, remote_depth: usize, local_cid: Cid, remote_cid: Cid) -> Side {
    if local_depth != remote_depth {
        if local_depth > remote_depth {
            Side::Local
        } else {
            Side::Remote
        }
    } else if local_cid.to_bytes() > remote_cid.to_bytes() {
        Side::Local
    } else {
        Side::Remote
    }
}

async fn resolve_public_conflict(
    store: &BlockStore,
    local: &Link,
    remote: &Link,
) -> Result<Side, FsError> {
    let l_chain = public_chain(store, local.cid, MERGE_SEARCH_HORIZON).await?;
    let r_chain = public_chain(store, remote.cid, MERGE_SEARCH_HORIZON).await?;
    match classify(&l_chain, &r_chain) {
        Ok(SyncStatus::InSync) | Ok(SyncStatus::LocalAhead) => Ok(Side::Local),
        Ok(SyncStatus::RemoteAhead) => Ok(Side::Remote),
        Ok(SyncStatus::Diverged(d)) => Ok(deeper_side(
            d.local_depth,
            d.remote_depth,
            local.cid,
            remote.cid,
        )),
        // unrelated writes at the same name: compare whole histories
        Err(FsError::NoCommonHistory) => Ok(deeper_side(
            l_chain.len(),
            r_chain.len(),
            local.cid,
            remote.cid,
        )),
        Err(err) => Err(err),
    }
}

/// Merge a remote public tree into a local one.
///
/// Both trees must be persisted and their blocks resolvable from the
/// local store. `InSync` and `LocalAhead` return the local tree
/// untouched; `FastForward` adopts the remote; diverged histories
/// produce a merge commit whose `previous` is the local version and
/// whose `merge` pointer is the remote.
pub async fn merge_public(
    local: &PublicTree,
    remote: &PublicTree,
    policy: ConflictPolicy,
    commit: bool,
) -> Result<(PublicTree, MergeType), FsError> {
    let store = local.store().clone();
    let l_cid = local
        .cid()
        .ok_or_else(|| anyhow::anyhow!("merge requires a persisted local tree"))?;
    let r_cid = remote
        .cid()
        .ok_or_else(|| anyhow::anyhow!("merge requires a persisted remote tree"))?;

    let l_chain = public_chain(&store, l_cid, MERGE_SEARCH_HORIZON).await?;
    let r_chain = public_chain(&store, r_cid, MERGE_SEARCH_HORIZON).await?;

    match classify(&l_chain, &r_chain)? {
        SyncStatus::InSync => Ok((local.clone(), MergeType::InSync)),
        SyncStatus::LocalAhead => Ok((local.clone(), MergeType::LocalAhead)),
        SyncStatus::RemoteAhead => {
            let adopted = PublicTree::load(store, local.name(), r_cid).await?;
            Ok((adopted, MergeType::FastForward))
        }
        SyncStatus::Diverged(divergence) => {
            tracing::debug!(
                "merging public trees diverged {}/{} commits since {}",
                divergence.remote_depth,
                divergence.local_depth,
                divergence.lca
            );
            let merged =
                merge_commit_public(&store, local, remote, divergence.lca, policy, commit).await?;
            Ok((merged, MergeType::MergeCommit))
        }
    }
}

async fn merge_commit_public(
    store: &BlockStore,
    local: &PublicTree,
    remote: &PublicTree,
    lca_cid: Cid,
    policy: ConflictPolicy,
    commit: bool,
) -> Result<PublicTree, FsError> {
    let lca = PublicTree::load(store.clone(), local.name(), lca_cid).await?;

    let names: BTreeSet<String> = local
        .links()
        .keys()
        .chain(remote.links().keys())
        .cloned()
        .collect();

    let mut links = Links::new();
    let mut skeleton = Skeleton::new();
    let mut keep = |name: &str, link: &Link, info: Option<&crate::node::SkeletonInfo>| {
        links.insert(name.to_string(), link.clone());
        if let Some(info) = info {
            skeleton.insert(name.to_string(), info.clone());
        }
    };

    for name in &names {
        match (local.links().get(name), remote.links().get(name)) {
            (Some(l), None) => {
                // absent on the remote side: a deletion if the entry is
                // unchanged since the ancestor, an edit-wins keep otherwise
                let deleted_unchanged = lca
                    .links()
                    .get(name)
                    .map(|base| base.cid == l.cid)
                    .unwrap_or(false);
                if !deleted_unchanged {
                    keep(name, l, local.skeleton().get(name));
                }
            }
            (None, Some(r)) => {
                let deleted_unchanged = lca
                    .links()
                    .get(name)
                    .map(|base| base.cid == r.cid)
                    .unwrap_or(false);
                if !deleted_unchanged {
                    keep(name, r, remote.skeleton().get(name));
                }
            }
            (Some(l), Some(r)) if l.cid == r.cid => {
                keep(name, l, local.skeleton().get(name));
            }
            (Some(l), Some(r)) if !l.is_file && !r.is_file => {
                let l_child = PublicTree::load(store.clone(), name.clone(), l.cid).await?;
                let r_child = PublicTree::load(store.clone(), name.clone(), r.cid).await?;
                let (merged_child, _) =
                    Box::pin(merge_public(&l_child, &r_child, policy, commit)).await?;
                let link = merged_child.to_link()?;
                let info = merged_child.skeleton_info()?;
                keep(name, &link, Some(&info));
            }
            (Some(l), Some(r)) => {
                if l.is_file != r.is_file && policy == ConflictPolicy::Fail {
                    return Err(FsError::TypeConflict(name.clone()));
                }
                match resolve_public_conflict(store, l, r).await? {
                    Side::Local => keep(name, l, local.skeleton().get(name)),
                    Side::Remote => keep(name, r, remote.skeleton().get(name)),
                }
            }
            (None, None) => unreachable!("name drawn from the union of both sides"),
        }
    }

    let mut merged = local.clone();
    merged.replace_children(links, skeleton);
    merged.set_merge_pointer(remote.cid());
    merged.put(commit).await?;
    Ok(merged)
}

async fn private_cid_chain(
    store: &BlockStore,
    node: &PrivateNode,
) -> Result<(Vec<Cid>, Vec<Backlink>), FsError> {
    let backlinks = private_chain(store, node, MERGE_SEARCH_HORIZON).await?;
    let cids = backlinks.iter().map(|b| b.cid).collect();
    Ok((cids, backlinks))
}

async fn resolve_private_conflict(
    store: &BlockStore,
    name: &str,
    local: &PrivateLink,
    remote: &PrivateLink,
) -> Result<Side, FsError> {
    let l_node = PrivateNode::load(store.clone(), name, local).await?;
    let r_node = PrivateNode::load(store.clone(), name, remote).await?;
    let l_cid = l_node.cid().expect("loaded node has a cid");
    let r_cid = r_node.cid().expect("loaded node has a cid");

    let (l_chain, _) = private_cid_chain(store, &l_node).await?;
    let (r_chain, _) = private_cid_chain(store, &r_node).await?;

    match classify(&l_chain, &r_chain) {
        Ok(SyncStatus::InSync) | Ok(SyncStatus::LocalAhead) => Ok(Side::Local),
        Ok(SyncStatus::RemoteAhead) => Ok(Side::Remote),
        Ok(SyncStatus::Diverged(d)) => {
            Ok(deeper_side(d.local_depth, d.remote_depth, l_cid, r_cid))
        }
        Err(FsError::NoCommonHistory) => {
            Ok(deeper_side(l_chain.len(), r_chain.len(), l_cid, r_cid))
        }
        Err(err) => Err(err),
    }
}

/// Merge a remote private tree into a local one. The forest must
/// already hold both sides' entries (see `PrivateForest::absorb`).
///
/// The merged node keeps the local node's identity and ratchet —
/// advancing it one generation past the local head — and records the
/// remote generation through its merge backlink.
pub async fn merge_private(
    local: &PrivateTree,
    remote: &PrivateTree,
    forest: &mut PrivateForest,
    policy: ConflictPolicy,
    commit: bool,
) -> Result<(PrivateTree, MergeType), FsError> {
    let store = local.store().clone();
    let r_cid = remote
        .cid()
        .ok_or_else(|| anyhow::anyhow!("merge requires a persisted remote tree"))?;

    let (l_chain, l_backlinks) =
        private_cid_chain(&store, &PrivateNode::Tree(local.clone())).await?;
    let (r_chain, _) = private_cid_chain(&store, &PrivateNode::Tree(remote.clone())).await?;

    match classify(&l_chain, &r_chain)? {
        SyncStatus::InSync => Ok((local.clone(), MergeType::InSync)),
        SyncStatus::LocalAhead => Ok((local.clone(), MergeType::LocalAhead)),
        SyncStatus::RemoteAhead => Ok((remote.clone(), MergeType::FastForward)),
        SyncStatus::Diverged(divergence) => {
            let lca_backlink = l_backlinks[divergence.local_depth].clone();
            let lca = PrivateNode::load_backlink(store.clone(), local.name(), &lca_backlink)
                .await?
                .into_tree()
                .ok_or_else(|| anyhow::anyhow!("ancestor of a tree is not a tree"))?;
            let merged = merge_commit_private(
                &store, local, remote, &lca, forest, policy, commit, r_cid,
            )
            .await?;
            Ok((merged, MergeType::MergeCommit))
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn merge_commit_private(
    store: &BlockStore,
    local: &PrivateTree,
    remote: &PrivateTree,
    lca: &PrivateTree,
    forest: &mut PrivateForest,
    policy: ConflictPolicy,
    commit: bool,
    remote_cid: Cid,
) -> Result<PrivateTree, FsError> {
    let names: BTreeSet<String> = local
        .links()
        .keys()
        .chain(remote.links().keys())
        .cloned()
        .collect();

    let mut links: BTreeMap<String, PrivateLink> = BTreeMap::new();
    let mut skeleton = Skeleton::new();

    for name in &names {
        match (local.links().get(name), remote.links().get(name)) {
            (Some(l), None) => {
                let deleted_unchanged = lca
                    .links()
                    .get(name)
                    .map(|base| base.cid == l.cid)
                    .unwrap_or(false);
                if !deleted_unchanged {
                    links.insert(name.clone(), l.clone());
                    if let Some(info) = local.skeleton().get(name) {
                        skeleton.insert(name.clone(), info.clone());
                    }
                }
            }
            (None, Some(r)) => {
                let deleted_unchanged = lca
                    .links()
                    .get(name)
                    .map(|base| base.cid == r.cid)
                    .unwrap_or(false);
                if !deleted_unchanged {
                    links.insert(name.clone(), r.clone());
                    if let Some(info) = remote.skeleton().get(name) {
                        skeleton.insert(name.clone(), info.clone());
                    }
                }
            }
            (Some(l), Some(r)) if l.cid == r.cid => {
                links.insert(name.clone(), l.clone());
                if let Some(info) = local.skeleton().get(name) {
                    skeleton.insert(name.clone(), info.clone());
                }
            }
            (Some(l), Some(r)) if !l.is_file && !r.is_file => {
                let l_child = PrivateNode::load(store.clone(), name.clone(), l)
                    .await?
                    .into_tree()
                    .ok_or_else(|| FsError::NotADirectory(name.clone()))?;
                let r_child = PrivateNode::load(store.clone(), name.clone(), r)
                    .await?
                    .into_tree()
                    .ok_or_else(|| FsError::NotADirectory(name.clone()))?;
                let (merged_child, _) =
                    Box::pin(merge_private(&l_child, &r_child, forest, policy, commit)).await?;
                let child_cid = merged_child
                    .cid()
                    .ok_or_else(|| anyhow::anyhow!("merged child was not persisted"))?;
                let link = PrivateLink {
                    ratchet: merged_child.ratchet().clone(),
                    name: merged_child.private_name(),
                    cid: child_cid,
                    size: merged_child.size(),
                    is_file: false,
                };
                skeleton.insert(name.clone(), merged_child.skeleton_info()?);
                links.insert(name.clone(), link);
            }
            (Some(l), Some(r)) => {
                if l.is_file != r.is_file && policy == ConflictPolicy::Fail {
                    return Err(FsError::TypeConflict(name.clone()));
                }
                match resolve_private_conflict(store, name, l, r).await? {
                    Side::Local => {
                        links.insert(name.clone(), l.clone());
                        if let Some(info) = local.skeleton().get(name) {
                            skeleton.insert(name.clone(), info.clone());
                        }
                    }
                    Side::Remote => {
                        links.insert(name.clone(), r.clone());
                        if let Some(info) = remote.skeleton().get(name) {
                            skeleton.insert(name.clone(), info.clone());
                        }
                    }
                }
            }
            (None, None) => unreachable!("name drawn from the union of both sides"),
        }
    }

    let mut merged = local.clone();
    merged.replace_children(links, skeleton);
    merged.set_merge_backlink(Some(Backlink {
        cid: remote_cid,
        ratchet: remote.ratchet().clone(),
    }));
    merged.put(forest, commit).await?;
    Ok(merged)
}
