use vertex_dht_primitives::Identifier;

/// Rejected routing table updates.
///
/// These indicate a transport layer reporting connections out of order; the
/// table is left untouched.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoutingError {
    /// The local identity was reported as a connected peer.
    #[error("refusing to connect to the local identity")]
    SelfConnect,

    /// A connect was reported for a peer that is already connected.
    #[error("peer {0} is already connected")]
    AlreadyConnected(Identifier),

    /// A disconnect was reported for a peer that is not connected.
    #[error("peer {0} is not connected")]
    UnknownPeer(Identifier),
}
