/**
 * Cryptographic types and operations.
 *  - Symmetric content keys (ChaCha20-Poly1305)
 *  - The forward-secret ratchet private nodes derive
 *    their keys from
 *  - Bloom-filter name tags private nodes are indexed under
 */
mod key;
mod namefilter;
mod ratchet;

pub use key::{Key, KeyError, KEY_SIZE, NONCE_SIZE};
pub use namefilter::{
    Namefilter, PrivateName, FILTER_SIZE, HASH_COUNT, SATURATION_THRESHOLD,
};
pub use ratchet::{Ratchet, RatchetError};
