use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::cid::Cid;
use super::codec::BlockEncoded;

/// A named edge in the DAG: one directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub name: String,
    pub cid: Cid,
    pub size: u64,
    pub is_file: bool,
}

impl Link {
    pub fn new(name: impl Into<String>, cid: Cid, size: u64, is_file: bool) -> Self {
        Link {
            name: name.into(),
            cid,
            size,
            is_file,
        }
    }
}

/// A directory's children, keyed by name. Names are unique within
/// a directory; the map key always matches `link.name`.
pub type Links = BTreeMap<String, Link>;

/// The userland block of a public tree: its link table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LinkBlock {
    pub links: Links,
}

impl BlockEncoded for LinkBlock {}

#[cfg(test)]
mod tests {
    use super::*;
    use iroh_blobs::Hash;

    #[test]
    fn test_link_block_roundtrip() {
        let mut block = LinkBlock::default();
        block.links.insert(
            "hello.txt".to_string(),
            Link::new("hello.txt", Cid::raw(Hash::new(b"hello!")), 6, true),
        );
        block.links.insert(
            "dir".to_string(),
            Link::new("dir", Cid::cbor(Hash::new(b"dir header")), 0, false),
        );

        let encoded = block.encode().unwrap();
        let decoded = LinkBlock::decode(&encoded).unwrap();

        assert_eq!(block, decoded);
    }
}
