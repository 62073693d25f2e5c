//! Bloom-filter name tags for private nodes.
//!
//! A `Namefilter` is a fixed 2048-bit bloom filter. A private node's
//! bare filter accumulates its ancestors' identifiers plus its own, so
//! ancestry is checkable with a bitwise subset test while the path
//! itself stays opaque. Adding the node's per-generation ratchet seed
//! and saturating to a calibrated bit density yields the `PrivateName`
//! the node is indexed under in the store: equal only for the same
//! node at the same generation, and unlinkable across generations.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Filter width in bytes (2048 bits)
pub const FILTER_SIZE: usize = 256;
/// Bits set per added element
pub const HASH_COUNT: usize = 30;
/// Bit density at which a filter counts as saturated
pub const SATURATION_THRESHOLD: u32 = 1019;

#[derive(Clone, PartialEq, Eq)]
pub struct Namefilter([u8; FILTER_SIZE]);

impl Default for Namefilter {
    fn default() -> Self {
        Namefilter([0; FILTER_SIZE])
    }
}

impl Namefilter {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add an element: sets `HASH_COUNT` hash-derived bits
    pub fn add(&mut self, element: &[u8]) {
        for index in bit_indices(element) {
            self.0[index / 8] |= 1 << (index % 8);
        }
    }

    /// Whether every bit for this element is set
    pub fn has(&self, element: &[u8]) -> bool {
        bit_indices(element).all(|index| self.0[index / 8] & (1 << (index % 8)) != 0)
    }

    /// Whether all of `other`'s bits are set here (ancestry test)
    pub fn contains(&self, other: &Namefilter) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(ours, theirs)| ours & theirs == *theirs)
    }

    pub fn count_ones(&self) -> u32 {
        self.0.iter().map(|b| b.count_ones()).sum()
    }

    /// True once bit density has passed the calibrated threshold
    pub fn saturated(&self) -> bool {
        self.count_ones() >= SATURATION_THRESHOLD
    }

    /// Deterministically add filter-derived elements until saturated.
    /// Names are always saturated before use so every stored name has
    /// the same bit density.
    pub fn saturate(&mut self) {
        let mut round: u64 = 0;
        while !self.saturated() {
            let mut element = Vec::with_capacity(FILTER_SIZE + 8);
            element.extend_from_slice(&self.0);
            element.extend_from_slice(&round.to_le_bytes());
            self.add(&element);
            round += 1;
        }
    }

    /// The saturated name for this filter at the given generation seed
    pub fn name(&self, ratchet_seed: &[u8; 32]) -> PrivateName {
        let mut filter = self.clone();
        filter.add(ratchet_seed);
        filter.saturate();
        PrivateName(filter.0)
    }

    pub fn as_bytes(&self) -> &[u8; FILTER_SIZE] {
        &self.0
    }
}

impl fmt::Debug for Namefilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Namefilter({}…, {} bits)",
            hex::encode(&self.0[..4]),
            self.count_ones()
        )
    }
}

/// The serialized namefilter bytes a private node is stored under.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrivateName([u8; FILTER_SIZE]);

impl PrivateName {
    pub fn as_bytes(&self) -> &[u8; FILTER_SIZE] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, base64::DecodeError> {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD.decode(encoded)?;
        if bytes.len() != FILTER_SIZE {
            return Err(base64::DecodeError::InvalidLength(bytes.len()));
        }
        let mut out = [0u8; FILTER_SIZE];
        out.copy_from_slice(&bytes);
        Ok(PrivateName(out))
    }
}

impl fmt::Debug for PrivateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateName({}…)", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for PrivateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

/// Iterator over the bit positions an element maps to, drawn from a
/// BLAKE3 extended output over the element
fn bit_indices(element: &[u8]) -> impl Iterator<Item = usize> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(element);
    let mut reader = hasher.finalize_xof();
    let mut buf = [0u8; HASH_COUNT * 2];
    reader.fill(&mut buf);
    (0..HASH_COUNT).map(move |i| {
        let pair = [buf[i * 2], buf[i * 2 + 1]];
        u16::from_le_bytes(pair) as usize % (FILTER_SIZE * 8)
    })
}

macro_rules! bytes_serde {
    ($type:ident, $visitor:ident, $expecting:literal) => {
        impl Serialize for $type {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_bytes(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $type {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct $visitor;

                impl<'de> Visitor<'de> for $visitor {
                    type Value = $type;

                    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                        f.write_str($expecting)
                    }

                    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                        if v.len() != FILTER_SIZE {
                            return Err(E::invalid_length(v.len(), &self));
                        }
                        let mut out = [0u8; FILTER_SIZE];
                        out.copy_from_slice(v);
                        Ok($type(out))
                    }
                }

                deserializer.deserialize_bytes($visitor)
            }
        }
    };
}

bytes_serde!(Namefilter, NamefilterVisitor, "a 256-byte namefilter");
bytes_serde!(PrivateName, PrivateNameVisitor, "a 256-byte private name");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic() {
        let el = "👋".as_bytes();
        let mut f = Namefilter::empty();
        assert!(!f.has(el), "expected new filter to not have element");

        f.add(el);
        assert!(f.has(el), "filter should have element after adding");

        assert!(
            !f.has("👋👋".as_bytes()),
            "similar string should not be in filter"
        );
    }

    #[test]
    fn test_contains_ancestry() {
        let mut parent = Namefilter::empty();
        parent.add(b"parent inumber");

        let mut child = parent.clone();
        child.add(b"child inumber");

        assert!(child.contains(&parent));
        assert!(!parent.contains(&child));
    }

    #[test]
    fn test_saturate_is_deterministic() {
        let mut a = Namefilter::empty();
        a.add(b"some node");
        let mut b = a.clone();

        a.saturate();
        b.saturate();

        assert!(a.saturated());
        assert_eq!(a, b);
    }

    #[test]
    fn test_names_differ_across_generations() {
        let mut bare = Namefilter::empty();
        bare.add(b"node identity");

        let name_a = bare.name(&[1u8; 32]);
        let name_b = bare.name(&[2u8; 32]);

        assert_ne!(name_a, name_b);
        // both saturated to the same density band
        let ones = |n: &PrivateName| {
            n.as_bytes().iter().map(|b| b.count_ones()).sum::<u32>()
        };
        assert!(ones(&name_a) >= SATURATION_THRESHOLD);
        assert!(ones(&name_b) >= SATURATION_THRESHOLD);
    }

    #[test]
    fn test_name_is_stable() {
        let mut bare = Namefilter::empty();
        bare.add(b"node identity");

        assert_eq!(bare.name(&[7u8; 32]), bare.name(&[7u8; 32]));
    }

    #[test]
    fn test_private_name_base64_roundtrip() {
        let mut bare = Namefilter::empty();
        bare.add(b"node");
        let name = bare.name(&[3u8; 32]);

        let encoded = name.to_base64();
        let decoded = PrivateName::from_base64(&encoded).unwrap();
        assert_eq!(name, decoded);
    }
}
