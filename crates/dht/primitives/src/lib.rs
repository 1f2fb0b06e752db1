//! Core primitive types for the Vertex DHT.
//!
//! Kept separate from the routing and protocol crates so that the wire codec,
//! the routing table and the message router all agree on one definition of an
//! identifier, its distance metric and the Bloom filters that travel with
//! every in-flight request.

mod block;
mod bloom;
mod distance;
mod hello;
mod identifier;
mod options;
mod path;

pub use block::BlockType;
pub use bloom::{BLOOM_K, PEER_FILTER_BYTES, PeerFilter, ReplyFilter};
pub use distance::{bucket_index, matching_bits, scalar_distance};
pub use hello::{Hello, HelloError};
pub use identifier::{IDENTIFIER_BITS, IDENTIFIER_BYTES, Identifier, IdentifierParseError};
pub use options::RouteOptions;
pub use path::PeerPath;

/// Number of buckets in a routing table, one per possible count of matching bits
/// short of a full match.
pub const BUCKET_COUNT: usize = IDENTIFIER_BITS;
