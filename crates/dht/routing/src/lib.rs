//! Kademlia routing core of the Vertex DHT.
//!
//! # Architecture
//!
//! - [`RoutingTable`]: directly connected peers, bucketed by the number of
//!   leading bits they share with the local identity.
//! - [`ConnectivityAdvisor`]: how strongly the networking layer should seek or
//!   keep connections to given identities.
//! - [`ReplicationEstimator`]: how many peers a request is forwarded to at its
//!   current hop.
//! - [`PeerSelector`]: which peers those are, honouring the request's filter of
//!   already visited peers.
//!
//! All of these are plain owned values mutated from a single task; none of
//! them lock.

mod advisor;
mod config;
mod error;
mod metrics;
mod replication;
mod selector;
mod table;

pub use advisor::{Connectivity, ConnectivityAdvisor, DesiredPeer, NoConnectivity};
pub use config::{DEFAULT_BUCKET_SIZE, DEFAULT_MAX_REPLICATION, RoutingArgs, RoutingConfig};
pub use error::RoutingError;
pub use replication::ReplicationEstimator;
pub use selector::PeerSelector;
pub use table::{PeerHandle, RoutingTable};
