use vertex_dht_primitives::Identifier;
use vertex_dht_routing::RoutingError;
use vertex_dht_wire::WireError;

/// Ways a neighbour's message can break the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("block does not hash to the key it was sent under")]
    KeyMismatch,
    #[error("malformed block")]
    InvalidBlock,
    #[error("malformed request")]
    InvalidRequest,
    #[error("malformed HELLO")]
    InvalidHello,
    #[error("undecodable message")]
    Malformed,
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// The message was dropped and the peer should be treated as faulty.
    #[error("protocol violation by {peer}: {reason}")]
    ProtocolViolation { peer: Identifier, reason: Violation },

    /// A block or request submitted by a local client was malformed.
    #[error("rejected local request: {0}")]
    Rejected(Violation),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Wire(#[from] WireError),
}

impl RouterError {
    pub fn is_violation(&self) -> bool {
        matches!(self, Self::ProtocolViolation { .. })
    }
}
