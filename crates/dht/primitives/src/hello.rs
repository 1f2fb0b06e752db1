//! HELLO records: a peer's self-describing reachability information.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{IDENTIFIER_BYTES, Identifier};

/// Error decoding a [`Hello`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HelloError {
    #[error("hello too short: {0} bytes")]
    TooShort(usize),
}

/// Identity followed by an opaque address blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hello {
    peer: Identifier,
    addresses: Bytes,
}

impl Hello {
    pub fn new(peer: Identifier, addresses: impl Into<Bytes>) -> Self {
        Self {
            peer,
            addresses: addresses.into(),
        }
    }

    pub const fn peer(&self) -> &Identifier {
        &self.peer
    }

    pub fn addresses(&self) -> &Bytes {
        &self.addresses
    }

    /// DHT key a HELLO is stored under: the identity it describes.
    pub const fn key(&self) -> Identifier {
        self.peer
    }

    pub fn decode(payload: &[u8]) -> Result<Self, HelloError> {
        let (id, rest) = payload
            .split_at_checked(IDENTIFIER_BYTES)
            .ok_or(HelloError::TooShort(payload.len()))?;
        let peer = Identifier::from_slice(id).ok_or(HelloError::TooShort(payload.len()))?;
        Ok(Self::new(peer, Bytes::copy_from_slice(rest)))
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(IDENTIFIER_BYTES + self.addresses.len());
        buf.put_slice(self.peer.as_bytes());
        buf.put_slice(&self.addresses);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_codec() {
        let hello = Hello::new(Identifier::digest(b"peer"), &b"/ip4/127.0.0.1"[..]);
        let decoded = Hello::decode(&hello.encode()).unwrap();
        assert_eq!(decoded, hello);
        assert_eq!(decoded.key(), Identifier::digest(b"peer"));
    }

    #[test]
    fn test_hello_too_short() {
        assert_eq!(Hello::decode(&[0u8; 10]), Err(HelloError::TooShort(10)));
    }
}
