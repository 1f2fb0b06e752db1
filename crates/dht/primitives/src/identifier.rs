//! 512-bit identifiers shared by peer identities and DHT keys.

use std::{fmt, str::FromStr};

use rand::Rng;
use sha2::{Digest, Sha512};

/// Length of an identifier in bytes.
pub const IDENTIFIER_BYTES: usize = 64;

/// Length of an identifier in bits.
pub const IDENTIFIER_BITS: usize = IDENTIFIER_BYTES * 8;

/// A fixed-size opaque identifier.
///
/// Used both as the hash of a peer's identity and as a DHT key. Bits are
/// numbered from the most significant bit of the first byte ("left-to-right"),
/// which is the order in which prefixes are compared.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier([u8; IDENTIFIER_BYTES]);

impl Identifier {
    /// The all-zero identifier.
    pub const ZERO: Self = Self([0u8; IDENTIFIER_BYTES]);

    /// Wrap raw bytes.
    pub const fn new(bytes: [u8; IDENTIFIER_BYTES]) -> Self {
        Self(bytes)
    }

    /// Build an identifier from a slice, returning `None` unless it is exactly
    /// [`IDENTIFIER_BYTES`] long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; IDENTIFIER_BYTES]>::try_from(bytes).ok().map(Self)
    }

    /// SHA-512 digest of arbitrary data.
    pub fn digest(data: impl AsRef<[u8]>) -> Self {
        Self(Sha512::digest(data.as_ref()).into())
    }

    /// A uniformly random identifier.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; IDENTIFIER_BYTES];
        rng.fill(&mut bytes[..]);
        Self(bytes)
    }

    /// Borrow the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; IDENTIFIER_BYTES] {
        &self.0
    }

    /// Value of bit `index`, counted from the most significant bit.
    ///
    /// Indices past the end read as `false`.
    pub fn bit(&self, index: usize) -> bool {
        self.0
            .get(index / 8)
            .is_some_and(|byte| byte & (0x80 >> (index % 8)) != 0)
    }

    /// Copy of this identifier with bit `index` inverted.
    ///
    /// Flipping bit `i` yields an identifier sharing exactly `i` leading bits
    /// with the original, which makes it the canonical way to place an
    /// identifier in a chosen bucket.
    pub fn with_flipped_bit(&self, index: usize) -> Self {
        let mut bytes = self.0;
        if let Some(byte) = bytes.get_mut(index / 8) {
            *byte ^= 0x80 >> (index % 8);
        }
        Self(bytes)
    }

    /// The i-th 32-bit big-endian word.
    pub(crate) fn word(&self, index: usize) -> u32 {
        let start = (index % (IDENTIFIER_BYTES / 4)) * 4;
        let mut word = [0u8; 4];
        if let Some(chunk) = self.0.get(start..start + 4) {
            word.copy_from_slice(chunk);
        }
        u32::from_be_bytes(word)
    }

    /// Full lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; IDENTIFIER_BYTES]> for Identifier {
    fn from(bytes: [u8; IDENTIFIER_BYTES]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Identifier {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Short form: the first eight bytes in hex, enough to tell peers apart in logs.
impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({self})")
    }
}

/// Error parsing an identifier from hex.
#[derive(Debug, thiserror::Error)]
pub enum IdentifierParseError {
    /// Not valid hex.
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Valid hex of the wrong length.
    #[error("expected {IDENTIFIER_BYTES} bytes, got {0}")]
    Length(usize),
}

impl FromStr for Identifier {
    type Err = IdentifierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim_start_matches("0x"))?;
        Self::from_slice(&bytes).ok_or(IdentifierParseError::Length(bytes.len()))
    }
}
