#![allow(dead_code, unreachable_pub)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime},
};

use bytes::Bytes;
use rand::RngCore;
use tokio::sync::mpsc;
use vertex_dht_primitives::{
    BUCKET_COUNT, BlockType, Hello, Identifier, PeerFilter, PeerPath, RouteOptions,
};
use vertex_dht_router::{
    Block, ContentStore, FixedNetworkSize, LocalLookup, LookupEvaluation, MemoryContentStore, MessageRouter,
    OutboundQueue, Query, RouterConfig, RouterServices,
};
use vertex_dht_routing::{Connectivity, RoutingConfig};
use vertex_dht_wire::{DhtMessage, PutMessage};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// Returns the same word forever.
pub struct ConstRng(pub u32);

impl RngCore for ConstRng {
    fn next_u32(&mut self) -> u32 {
        self.0
    }

    fn next_u64(&mut self) -> u64 {
        u64::from(self.0) << 32 | u64::from(self.0)
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        for chunk in dst.chunks_mut(4) {
            let word = self.0.to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }
}

/// An identity sharing exactly `BUCKET_COUNT - bucket - 1` leading bits with
/// `local`. `tag` varies the last byte, so keep `bucket` above 8 when it is
/// nonzero.
pub fn peer_in_bucket(local: &Identifier, bucket: usize, tag: u8) -> Identifier {
    let mut bytes = *local.as_bytes();
    bytes[63] ^= tag;
    Identifier::new(bytes).with_flipped_bit(BUCKET_COUNT - bucket - 1)
}

/// Store counting its `put` calls.
#[derive(Debug, Default, Clone)]
pub struct CountingStore {
    pub puts: Arc<AtomicUsize>,
    inner: Arc<Mutex<MemoryContentStore>>,
}

impl CountingStore {
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

impl ContentStore for CountingStore {
    fn put(&mut self, block: Block) {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.lock().unwrap().put(block);
    }

    fn get(&mut self, query: &Query<'_>) -> LocalLookup {
        self.inner.lock().unwrap().get(query)
    }
}

/// Store that never answers right away.
#[derive(Debug, Default, Clone)]
pub struct DeferringStore {
    pub queries: Arc<AtomicUsize>,
}

impl ContentStore for DeferringStore {
    fn put(&mut self, _block: Block) {}

    fn get(&mut self, _query: &Query<'_>) -> LocalLookup {
        self.queries.fetch_add(1, Ordering::SeqCst);
        LocalLookup {
            blocks: Vec::new(),
            evaluation: LookupEvaluation::Deferred,
        }
    }
}

/// Connectivity hooks recording what they were told.
#[derive(Debug, Default, Clone)]
pub struct Recorder {
    pub suggested: Arc<Mutex<Vec<(Identifier, u32)>>>,
    pub offered: Arc<Mutex<Vec<Hello>>>,
}

impl Connectivity for Recorder {
    fn suggest(&mut self, peer: &Identifier, strength: u32) {
        self.suggested.lock().unwrap().push((*peer, strength));
    }

    fn cancel(&mut self, peer: &Identifier) {
        self.suggested.lock().unwrap().retain(|(p, _)| p != peer);
    }

    fn offer_hello(&mut self, hello: &Hello) {
        self.offered.lock().unwrap().push(hello.clone());
    }
}

pub fn router_with(local: Identifier, network_size: f64, services: impl FnOnce(RouterServices) -> RouterServices) -> MessageRouter {
    router_with_routing(local, network_size, RoutingConfig::default(), services)
}

pub fn router_with_routing(
    local: Identifier,
    network_size: f64,
    routing: RoutingConfig,
    services: impl FnOnce(RouterServices) -> RouterServices,
) -> MessageRouter {
    let services = services(RouterServices::new(
        MemoryContentStore::default(),
        FixedNetworkSize(network_size),
    ));
    MessageRouter::new(local, routing, RouterConfig::default(), services)
}

pub fn router(local: Identifier, network_size: f64) -> MessageRouter {
    router_with(local, network_size, |s| s)
}

/// Connect `peer` with a queue of `capacity` and return the queue's receiver.
pub fn connect(router: &mut MessageRouter, peer: Identifier, capacity: usize) -> mpsc::Receiver<DhtMessage> {
    let (queue, rx) = OutboundQueue::bounded(capacity);
    router.on_connected(peer, queue).unwrap();
    rx
}

pub fn drain(rx: &mut mpsc::Receiver<DhtMessage>) -> Vec<DhtMessage> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

pub fn put_message(key: Identifier, expiration: SystemTime, sender: &Identifier) -> PutMessage {
    let mut peer_filter = PeerFilter::new();
    peer_filter.insert(sender);
    PutMessage {
        options: RouteOptions::NONE,
        block_type: BlockType::TEST,
        hop_count: 0,
        desired_replication: 16,
        expiration,
        peer_filter,
        key,
        put_path: PeerPath::new(),
        payload: Bytes::from_static(b"value"),
    }
}

pub fn in_an_hour() -> SystemTime {
    SystemTime::now() + Duration::from_secs(3600)
}
