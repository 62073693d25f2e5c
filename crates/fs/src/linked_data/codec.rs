use serde::de::DeserializeOwned;
use serde::Serialize;

/// Errors produced while encoding or decoding blocks
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encode error: {0}")]
    Encode(#[from] serde_ipld_dagcbor::EncodeError<std::collections::TryReserveError>),
    #[error("decode error: {0}")]
    Decode(#[from] serde_ipld_dagcbor::DecodeError<std::convert::Infallible>),
}

/// Marker for the DAG-CBOR block codec
#[derive(Debug, Clone, Copy)]
pub struct DagCborCodec;

/// Types that serialize to a single content-addressed block.
///  Every header, metadata, skeleton, and link-table structure in
///  the filesystem implements this; the store hashes the encoded
///  bytes to produce the block's CID.
pub trait BlockEncoded<C = DagCborCodec>: Serialize + DeserializeOwned {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_ipld_dagcbor::to_vec(self)?)
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(serde_ipld_dagcbor::from_slice(bytes)?)
    }
}
