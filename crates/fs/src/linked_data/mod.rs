/**
 * Internal wrapper around IPLD, renamed to
 *  something a little more down-to-earth.
 * Handles translation between IPLD CIDs and the
 *  BLAKE3 hashes the blob store is keyed by, and
 *  provides the DAG-CBOR block codec every node
 *  structure encodes with.
 */
mod cid;
mod codec;
mod link;

pub use cid::{Cid, CidError, LD_DAG_CBOR_CODEC, LD_RAW_CODEC};
pub use codec::{BlockEncoded, CodecError, DagCborCodec};
pub use link::{Link, LinkBlock, Links};
