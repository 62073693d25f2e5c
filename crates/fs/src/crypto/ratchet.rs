//! Forward-secret key derivation for private nodes.
//!
//! A `Ratchet` is a three-tier hash chain: a large, medium, and small
//! 32-byte state. Advancing one generation hashes the small state;
//! after 256 small steps the medium state is hashed and the small
//! chain is re-seeded from it, and likewise from medium into large.
//! Each tier's seed is derived from the bitwise complement of the
//! tier above, so no state earlier in the chain can be recovered from
//! a later one.
//!
//! From any state the node's symmetric key and its namefilter seed
//! are derived with domain-separated BLAKE3. Advancing is O(n) in the
//! number of generations, amortized by the tiered counters.

use serde::{Deserialize, Serialize};

use super::key::Key;

const KEY_CONTEXT: &str = "grove 2025-11-12 ratchet content key";
const NAME_CONTEXT: &str = "grove 2025-11-12 ratchet name seed";

#[derive(Debug, thiserror::Error)]
pub enum RatchetError {
    #[error("ratchet states are incomparable within the search horizon")]
    Incomparable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratchet {
    large: [u8; 32],
    medium: [u8; 32],
    medium_counter: u8,
    small: [u8; 32],
    small_counter: u8,
}

fn hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

fn complement(data: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (o, b) in out.iter_mut().zip(data.iter()) {
        *o = !b;
    }
    out
}

impl Ratchet {
    /// Sample a fresh ratchet from system entropy
    pub fn new() -> Self {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed).expect("failed to generate random bytes");
        Self::from_seed(seed)
    }

    /// Construct the generation-zero ratchet for a seed
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let medium_seed = hash(&complement(&seed));
        let small_seed = hash(&complement(&medium_seed));
        Ratchet {
            large: hash(&seed),
            medium: hash(&medium_seed),
            medium_counter: 0,
            small: hash(&small_seed),
            small_counter: 0,
        }
    }

    /// Advance one generation in place
    pub fn inc(&mut self) {
        if self.small_counter == u8::MAX {
            self.inc_medium();
        } else {
            self.small = hash(&self.small);
            self.small_counter += 1;
        }
    }

    fn inc_medium(&mut self) {
        if self.medium_counter == u8::MAX {
            self.inc_large();
        } else {
            self.medium = hash(&self.medium);
            self.medium_counter += 1;
            self.reseed_small();
        }
    }

    fn inc_large(&mut self) {
        self.large = hash(&self.large);
        let medium_seed = hash(&complement(&self.large));
        self.medium = hash(&medium_seed);
        self.medium_counter = 0;
        self.reseed_small();
    }

    fn reseed_small(&mut self) {
        let small_seed = hash(&complement(&self.medium));
        self.small = hash(&small_seed);
        self.small_counter = 0;
    }

    /// A ratchet `n` generations ahead of this one
    pub fn advance(&self, n: u64) -> Self {
        let mut next = self.clone();
        for _ in 0..n {
            next.inc();
        }
        next
    }

    fn state_bytes(&self) -> [u8; 96] {
        let mut out = [0u8; 96];
        out[..32].copy_from_slice(&self.large);
        out[32..64].copy_from_slice(&self.medium);
        out[64..].copy_from_slice(&self.small);
        out
    }

    /// The symmetric key for this generation
    pub fn key(&self) -> Key {
        Key::from(blake3::derive_key(KEY_CONTEXT, &self.state_bytes()))
    }

    /// The namefilter seed for this generation; distinct from `key`
    /// so a stored name reveals nothing about the content key
    pub fn name_seed(&self) -> [u8; 32] {
        blake3::derive_key(NAME_CONTEXT, &self.state_bytes())
    }

    /// Compare two states of the same ratchet chain.
    ///
    /// Returns the generation delta (`self` minus `other`): positive
    /// when `self` is ahead, negative when behind, zero when equal.
    /// States that are not within `horizon` generations of each other
    /// (or come from different seeds) are `Incomparable`.
    pub fn compare(&self, other: &Ratchet, horizon: u64) -> Result<i64, RatchetError> {
        if self == other {
            return Ok(0);
        }

        let mut probe = other.clone();
        for n in 1..=horizon {
            probe.inc();
            if &probe == self {
                return Ok(n as i64);
            }
        }

        let mut probe = self.clone();
        for n in 1..=horizon {
            probe.inc();
            if &probe == other {
                return Ok(-(n as i64));
            }
        }

        Err(RatchetError::Incomparable)
    }
}

impl Default for Ratchet {
    fn default() -> Self {
        Self::new()
    }
}
