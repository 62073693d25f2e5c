use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::linked_data::{BlockEncoded, Cid};

/// Cached recursive summary of a tree's shape: one entry per child,
/// with file entries carrying no sub-skeleton. Lets whole-subtree
/// queries run without dereferencing every block. Public trees store
/// this as its own block; private trees carry it inside the encrypted
/// node, where `userland` and `metadata` both point at the ciphertext
/// block that contains them.
pub type Skeleton = BTreeMap<String, SkeletonInfo>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkeletonInfo {
    pub cid: Cid,
    pub userland: Cid,
    pub metadata: Cid,
    pub sub_skeleton: Option<Skeleton>,
    pub is_file: bool,
}

impl SkeletonInfo {
    pub fn file(cid: Cid, userland: Cid, metadata: Cid) -> Self {
        SkeletonInfo {
            cid,
            userland,
            metadata,
            sub_skeleton: None,
            is_file: true,
        }
    }

    pub fn tree(cid: Cid, userland: Cid, metadata: Cid, sub: Skeleton) -> Self {
        SkeletonInfo {
            cid,
            userland,
            metadata,
            sub_skeleton: Some(sub),
            is_file: false,
        }
    }
}

/// The skeleton block of a public tree
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SkeletonBlock {
    pub skeleton: Skeleton,
}

impl BlockEncoded for SkeletonBlock {}

/// Walk a skeleton down a path of names
pub fn descend<'a>(skeleton: &'a Skeleton, path: &[String]) -> Option<&'a SkeletonInfo> {
    let (head, rest) = path.split_first()?;
    let info = skeleton.get(head)?;
    if rest.is_empty() {
        Some(info)
    } else {
        descend(info.sub_skeleton.as_ref()?, rest)
    }
}
