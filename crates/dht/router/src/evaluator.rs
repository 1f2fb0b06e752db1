//! Block-type specific validation.

use vertex_dht_primitives::{BlockType, Hello, Identifier, ReplyFilter};

/// Key a block's payload commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDerivation {
    Derived(Identifier),
    /// The payload is malformed for its type.
    Invalid,
    /// The block type does not bind payloads to keys.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestEvaluation {
    Valid,
    Invalid,
    TypeNotSupported,
}

/// How a reply relates to one pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyEvaluation {
    /// Deliver; further replies are welcome.
    OkMore,
    /// Deliver; the request is fully answered.
    OkLast,
    /// Already delivered to this requester.
    Duplicate,
    /// Valid but not what the requester asked for.
    Irrelevant,
    Invalid,
}

impl ReplyEvaluation {
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::OkMore | Self::OkLast)
    }
}

/// Validation hooks supplied by the block layer.
pub trait BlockEvaluator: Send {
    fn derive_key(&self, block_type: BlockType, payload: &[u8]) -> KeyDerivation;

    fn evaluate_request(
        &self,
        block_type: BlockType,
        key: &Identifier,
        xquery: &[u8],
        reply_filter: &ReplyFilter,
    ) -> RequestEvaluation;

    /// Evaluate a reply against one pending request. Deliverable replies are
    /// recorded in `reply_filter`.
    fn evaluate_reply(
        &self,
        block_type: BlockType,
        key: &Identifier,
        xquery: &[u8],
        reply_filter: &mut ReplyFilter,
        payload: &[u8],
    ) -> ReplyEvaluation;
}

/// Evaluator understanding HELLO blocks and treating every other type as
/// opaque.
///
/// HELLO replies are deduplicated by the identity they describe, everything
/// else by the digest of its payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBlockEvaluator;

impl DefaultBlockEvaluator {
    /// Value recorded in reply filters for a reply.
    pub fn reply_hash(block_type: BlockType, payload: &[u8]) -> Option<Identifier> {
        if block_type.is_hello() {
            Hello::decode(payload).ok().map(|hello| *hello.peer())
        } else {
            Some(Identifier::digest(payload))
        }
    }
}

impl BlockEvaluator for DefaultBlockEvaluator {
    fn derive_key(&self, block_type: BlockType, payload: &[u8]) -> KeyDerivation {
        if !block_type.is_hello() {
            return KeyDerivation::Unknown;
        }
        match Hello::decode(payload) {
            Ok(hello) => KeyDerivation::Derived(hello.key()),
            Err(_) => KeyDerivation::Invalid,
        }
    }

    fn evaluate_request(
        &self,
        block_type: BlockType,
        _key: &Identifier,
        xquery: &[u8],
        _reply_filter: &ReplyFilter,
    ) -> RequestEvaluation {
        if block_type.is_hello() && !xquery.is_empty() {
            return RequestEvaluation::Invalid;
        }
        RequestEvaluation::Valid
    }

    fn evaluate_reply(
        &self,
        block_type: BlockType,
        _key: &Identifier,
        _xquery: &[u8],
        reply_filter: &mut ReplyFilter,
        payload: &[u8],
    ) -> ReplyEvaluation {
        let Some(hash) = Self::reply_hash(block_type, payload) else {
            return ReplyEvaluation::Invalid;
        };
        if reply_filter.contains(&hash) {
            return ReplyEvaluation::Duplicate;
        }
        reply_filter.insert(&hash);
        ReplyEvaluation::OkMore
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_key_derivation() {
        let peer = Identifier::digest(b"peer");
        let hello = Hello::new(peer, &b"addr"[..]);
        let eval = DefaultBlockEvaluator;

        assert_eq!(eval.derive_key(BlockType::HELLO, &hello.encode()), KeyDerivation::Derived(peer));
        assert_eq!(eval.derive_key(BlockType::HELLO, b"short"), KeyDerivation::Invalid);
        assert_eq!(eval.derive_key(BlockType::TEST, b"anything"), KeyDerivation::Unknown);
    }

    #[test]
    fn test_hello_request_rejects_xquery() {
        let eval = DefaultBlockEvaluator;
        let key = Identifier::digest(b"k");
        let filter = ReplyFilter::empty(0);
        assert_eq!(eval.evaluate_request(BlockType::HELLO, &key, b"x", &filter), RequestEvaluation::Invalid);
        assert_eq!(eval.evaluate_request(BlockType::TEST, &key, b"x", &filter), RequestEvaluation::Valid);
    }

    #[test]
    fn test_reply_dedup() {
        let eval = DefaultBlockEvaluator;
        let key = Identifier::digest(b"k");
        let mut filter = ReplyFilter::empty(7);

        assert_eq!(eval.evaluate_reply(BlockType::TEST, &key, &[], &mut filter, b"v"), ReplyEvaluation::OkMore);
        assert_eq!(eval.evaluate_reply(BlockType::TEST, &key, &[], &mut filter, b"v"), ReplyEvaluation::Duplicate);
        assert_eq!(eval.evaluate_reply(BlockType::TEST, &key, &[], &mut filter, b"w"), ReplyEvaluation::OkMore);
    }

    #[test]
    fn test_hello_reply_filtered_by_peer() {
        let eval = DefaultBlockEvaluator;
        let peer = Identifier::digest(b"peer");
        let mut filter = ReplyFilter::with_capacity(1, 4);
        filter.insert(&peer);

        let hello = Hello::new(peer, &b"other address"[..]).encode();
        assert_eq!(
            eval.evaluate_reply(BlockType::HELLO, &peer, &[], &mut filter, &hello),
            ReplyEvaluation::Duplicate
        );
        assert_eq!(
            eval.evaluate_reply(BlockType::HELLO, &peer, &[], &mut filter, b"junk"),
            ReplyEvaluation::Invalid
        );
    }
}
