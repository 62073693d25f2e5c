use std::fmt;
use std::str::FromStr;

use ipld_core::cid::multihash::Multihash;
use iroh_blobs::Hash;
use serde::{Deserialize, Serialize};

/// Multicodec code for DAG-CBOR encoded blocks
pub const LD_DAG_CBOR_CODEC: u64 = 0x71;
/// Multicodec code for raw byte blocks
pub const LD_RAW_CODEC: u64 = 0x55;
/// Multihash code for BLAKE3
const BLAKE3_MH_CODE: u64 = 0x1e;

#[derive(Debug, thiserror::Error)]
pub enum CidError {
    #[error("cid parse error: {0}")]
    Parse(#[from] ipld_core::cid::Error),
    #[error("unsupported multihash code: {0:#x}")]
    UnsupportedHash(u64),
}

/// Content identifier of a stored block.
///  A CIDv1 over the BLAKE3 hash of the encoded block bytes, tagged
///  with the codec the block was written with. Equality is value
///  equality: two equal CIDs always reference identical bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cid(ipld_core::cid::Cid);

impl Cid {
    pub fn new(codec: u64, hash: Hash) -> Self {
        let mh = Multihash::<64>::wrap(BLAKE3_MH_CODE, hash.as_bytes())
            .expect("32-byte digest fits a 64-byte multihash");
        Cid(ipld_core::cid::Cid::new_v1(codec, mh))
    }

    /// CID of a DAG-CBOR block
    pub fn cbor(hash: Hash) -> Self {
        Self::new(LD_DAG_CBOR_CODEC, hash)
    }

    /// CID of a raw byte block
    pub fn raw(hash: Hash) -> Self {
        Self::new(LD_RAW_CODEC, hash)
    }

    pub fn codec(&self) -> u64 {
        self.0.codec()
    }

    /// The BLAKE3 hash the store keys this block under
    pub fn hash(&self) -> Result<Hash, CidError> {
        let mh = self.0.hash();
        if mh.code() != BLAKE3_MH_CODE {
            return Err(CidError::UnsupportedHash(mh.code()));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(mh.digest());
        Ok(Hash::from_bytes(bytes))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes()
    }

    pub fn inner(&self) -> &ipld_core::cid::Cid {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Cid {
    type Err = CidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Cid(ipld_core::cid::Cid::try_from(s)?))
    }
}

impl From<ipld_core::cid::Cid> for Cid {
    fn from(cid: ipld_core::cid::Cid) -> Self {
        Cid(cid)
    }
}
