//! Message routing for the Vertex DHT.
//!
//! # Architecture
//!
//! - [`MessageRouter`]: handles PUT, GET and RESULT messages, keeps the
//!   reverse paths of in-flight GETs and answers FIND-PEER requests.
//! - [`RouterService`]: feeds the router from a channel of [`Event`]s and runs
//!   the periodic FIND-PEER round.
//! - [`OutboundQueue`]: bounded per-neighbour queue of messages to send.
//!
//! Storage, block validation, HELLO lookup, local clients and the network
//! size estimate are supplied through [`RouterServices`].

mod config;
mod error;
mod evaluator;
mod event;
mod find_peer;
mod metrics;
mod pending;
mod queue;
mod router;
mod service;
mod services;
mod store;

pub use config::{
    DEFAULT_FIND_PEER_BUSY_BACKOFF, DEFAULT_FIND_PEER_MAX_INTERVAL, DEFAULT_FIND_PEER_MIN_INTERVAL,
    DEFAULT_FIND_PEER_REPLICATION, DEFAULT_GET_TIMEOUT, DEFAULT_HELLO_EXPIRATION,
    DEFAULT_MONITOR_CAPACITY, DEFAULT_PENDING_CAPACITY, RouterArgs, RouterConfig,
};
pub use error::{RouterError, Violation};
pub use evaluator::{
    BlockEvaluator, DefaultBlockEvaluator, KeyDerivation, ReplyEvaluation, RequestEvaluation,
};
pub use event::{Event, RouteEvent};
pub use self::metrics::RouterStats;
pub use pending::{PendingGet, Requester};
pub use queue::{EnqueueError, OutboundQueue};
pub use router::MessageRouter;
pub use service::RouterService;
pub use services::{
    FixedNetworkSize, HelloBook, HelloSource, LocalClients, LocalDelivery, NetworkSize,
    NoLocalClients, RouterServices,
};
pub use store::{
    Block, ContentStore, DEFAULT_STORE_CAPACITY, LocalLookup, LookupEvaluation, MemoryContentStore,
    Query,
};
