//! Bloom filters carried by in-flight requests.
//!
//! [`PeerFilter`] records which peers a PUT or GET has already visited and is
//! consulted before selecting forwarding targets. [`ReplyFilter`] records which
//! replies a GET requester has already seen.

use sha2::{Digest, Sha512};

use crate::{IDENTIFIER_BYTES, Identifier};

/// Number of bit positions set per element.
pub const BLOOM_K: usize = 16;

/// Wire size of the peer exclusion filter.
pub const PEER_FILTER_BYTES: usize = 128;

/// Upper bound on a reply filter's bitset.
const MAX_REPLY_FILTER_BYTES: usize = 1 << 15;

/// Smallest reply filter bitset.
const MIN_REPLY_FILTER_BYTES: usize = 8;

/// Element count a reply filter is sized for when first written to.
const DEFAULT_REPLY_ELEMENTS: usize = 32;

/// Bit positions of `id` in a filter of `bit_len` bits.
///
/// Positions are the raw words of `id`, so inputs are expected to be
/// uniformly distributed hashes such as peer identities or mingled reply
/// hashes. Structured identifiers with mostly zero words collapse onto a few
/// positions and make false positives far more likely.
fn positions(id: &Identifier, bit_len: usize) -> impl Iterator<Item = usize> + '_ {
    (0..BLOOM_K).map(move |i| id.word(i) as usize % bit_len)
}

fn set_bits(bits: &mut [u8], id: &Identifier) {
    let bit_len = bits.len() * 8;
    if bit_len == 0 {
        return;
    }
    for pos in positions(id, bit_len) {
        if let Some(byte) = bits.get_mut(pos / 8) {
            *byte |= 1 << (pos % 8);
        }
    }
}

fn test_bits(bits: &[u8], id: &Identifier) -> bool {
    let bit_len = bits.len() * 8;
    bit_len != 0
        && positions(id, bit_len)
            .all(|pos| bits.get(pos / 8).is_some_and(|byte| byte & (1 << (pos % 8)) != 0))
}

/// Fixed-size, insert-only set of visited peers.
#[derive(Clone, PartialEq, Eq)]
pub struct PeerFilter([u8; PEER_FILTER_BYTES]);

impl PeerFilter {
    /// An empty filter.
    pub const fn new() -> Self {
        Self([0u8; PEER_FILTER_BYTES])
    }

    /// Rebuild a filter from its wire form.
    pub const fn from_bytes(bytes: [u8; PEER_FILTER_BYTES]) -> Self {
        Self(bytes)
    }

    /// Wire form.
    pub const fn as_bytes(&self) -> &[u8; PEER_FILTER_BYTES] {
        &self.0
    }

    pub fn insert(&mut self, id: &Identifier) {
        set_bits(&mut self.0, id);
    }

    /// Whether `id` may have been inserted. False positives are possible.
    pub fn contains(&self, id: &Identifier) -> bool {
        test_bits(&self.0, id)
    }

    /// Whether nothing has been inserted yet.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl Default for PeerFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PeerFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let set: u32 = self.0.iter().map(|b| b.count_ones()).sum();
        f.debug_struct("PeerFilter").field("bits_set", &set).finish()
    }
}

/// Variable-size filter of replies a requester has already seen.
///
/// Elements are mingled with the request's mutator before insertion so that
/// two requests for the same key do not share false positives. An empty bitset
/// is a filter that contains nothing.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ReplyFilter {
    mutator: u32,
    bits: Vec<u8>,
}

impl ReplyFilter {
    /// An empty filter that allocates on first insert.
    pub const fn empty(mutator: u32) -> Self {
        Self {
            mutator,
            bits: Vec::new(),
        }
    }

    /// A filter sized for roughly `expected` elements.
    pub fn with_capacity(mutator: u32, expected: usize) -> Self {
        Self {
            mutator,
            bits: vec![0u8; Self::size_for(expected)],
        }
    }

    /// Rebuild a filter from its wire form.
    pub fn from_parts(mutator: u32, bits: Vec<u8>) -> Self {
        Self { mutator, bits }
    }

    /// Bitset length in bytes for `expected` elements: a power of two between
    /// 8 bytes and 32 KiB.
    pub fn size_for(expected: usize) -> usize {
        let ideal = expected.saturating_mul(BLOOM_K) / 4;
        ideal
            .max(MIN_REPLY_FILTER_BYTES)
            .checked_next_power_of_two()
            .unwrap_or(MAX_REPLY_FILTER_BYTES)
            .min(MAX_REPLY_FILTER_BYTES)
    }

    pub const fn mutator(&self) -> u32 {
        self.mutator
    }

    pub fn bits(&self) -> &[u8] {
        &self.bits
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|b| *b == 0)
    }

    /// `hash` combined with the mutator.
    pub fn mingle(&self, hash: &Identifier) -> Identifier {
        let mut hasher = Sha512::new();
        hasher.update(self.mutator.to_be_bytes());
        hasher.update(hash.as_bytes());
        let out: [u8; IDENTIFIER_BYTES] = hasher.finalize().into();
        Identifier::new(out)
    }

    pub fn insert(&mut self, hash: &Identifier) {
        if self.bits.is_empty() {
            self.bits = vec![0u8; Self::size_for(DEFAULT_REPLY_ELEMENTS)];
        }
        let mingled = self.mingle(hash);
        set_bits(&mut self.bits, &mingled);
    }

    pub fn contains(&self, hash: &Identifier) -> bool {
        !self.bits.is_empty() && test_bits(&self.bits, &self.mingle(hash))
    }

    /// Fold `other` into this filter.
    ///
    /// Only filters sharing a mutator and bitset size can be combined; an empty
    /// filter adopts `other` wholesale. Returns whether anything was merged.
    pub fn merge(&mut self, other: &Self) -> bool {
        if other.bits.is_empty() {
            return true;
        }
        if self.bits.is_empty() {
            *self = other.clone();
            return true;
        }
        if self.mutator != other.mutator || self.bits.len() != other.bits.len() {
            return false;
        }
        for (a, b) in self.bits.iter_mut().zip(&other.bits) {
            *a |= b;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_identifiers_collapse_onto_one_position() {
        // every word of both is a multiple of the bit length
        let first_bit = Identifier::ZERO.with_flipped_bit(0);
        let late_bit = Identifier::ZERO.with_flipped_bit(501);
        let mut filter = PeerFilter::new();
        filter.insert(&first_bit);
        assert!(filter.contains(&late_bit));

        let mut filter = PeerFilter::new();
        filter.insert(&Identifier::digest(first_bit));
        assert!(!filter.contains(&Identifier::digest(late_bit)));
    }

    #[test]
    fn test_peer_filter_insert_contains() {
        let mut filter = PeerFilter::new();
        let a = Identifier::digest(b"a");
        let b = Identifier::digest(b"b");

        assert!(filter.is_empty());
        assert!(!filter.contains(&a));
        filter.insert(&a);
        assert!(filter.contains(&a));
        assert!(!filter.contains(&b));
        assert!(!filter.is_empty());
    }

    #[test]
    fn test_peer_filter_wire_form() {
        let mut filter = PeerFilter::new();
        let a = Identifier::digest(b"a");
        filter.insert(&a);

        let restored = PeerFilter::from_bytes(*filter.as_bytes());
        assert!(restored.contains(&a));
        assert_eq!(restored, filter);
    }

    #[test]
    fn test_reply_filter_empty_contains_nothing() {
        let filter = ReplyFilter::empty(7);
        assert!(!filter.contains(&Identifier::digest(b"x")));
        assert!(filter.bits().is_empty());
    }

    #[test]
    fn test_reply_filter_mutator_changes_positions() {
        let x = Identifier::digest(b"x");
        let a = ReplyFilter::empty(1);
        let b = ReplyFilter::empty(2);
        assert_ne!(a.mingle(&x), b.mingle(&x));

        let mut filter = ReplyFilter::empty(1);
        filter.insert(&x);
        assert!(filter.contains(&x));
        assert_eq!(filter.bits().len(), ReplyFilter::size_for(DEFAULT_REPLY_ELEMENTS));
    }

    #[test]
    fn test_reply_filter_merge() {
        let x = Identifier::digest(b"x");
        let y = Identifier::digest(b"y");

        let mut a = ReplyFilter::with_capacity(3, 16);
        let mut b = ReplyFilter::with_capacity(3, 16);
        a.insert(&x);
        b.insert(&y);
        assert!(a.merge(&b));
        assert!(a.contains(&x) && a.contains(&y));

        let mut empty = ReplyFilter::empty(3);
        assert!(empty.merge(&a));
        assert_eq!(empty, a);

        let mut foreign = ReplyFilter::with_capacity(4, 16);
        foreign.insert(&y);
        let mut c = ReplyFilter::with_capacity(3, 16);
        c.insert(&x);
        assert!(!c.merge(&foreign));
        assert!(c.merge(&ReplyFilter::empty(9)));
    }

    #[test]
    fn test_size_for_bounds() {
        assert_eq!(ReplyFilter::size_for(0), 8);
        assert_eq!(ReplyFilter::size_for(32), 128);
        assert_eq!(ReplyFilter::size_for(usize::MAX), 1 << 15);
    }
}
