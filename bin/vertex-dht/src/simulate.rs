//! Deterministic in-process network of routers.
//!
//! Every link is a pair of [`OutboundQueue`]s. Messages taken off a queue are
//! framed with [`DhtCodec`] and decoded again before they reach the receiving
//! router, so the simulation also exercises the wire format.

use std::time::{Duration, SystemTime};

use asynchronous_codec::{Decoder, Encoder};
use bytes::{Bytes, BytesMut};
use eyre::{Result, WrapErr};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::index};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vertex_dht_primitives::{BlockType, Hello, Identifier, PeerPath, RouteOptions};
use vertex_dht_router::{
    Block, Event, FixedNetworkSize, HelloBook, LocalDelivery, MemoryContentStore, MessageRouter,
    OutboundQueue, RouterConfig, RouterServices, RouterStats,
};
use vertex_dht_routing::RoutingConfig;
use vertex_dht_wire::{DhtCodec, DhtMessage};

/// Upper bound on delivery passes before a phase is declared settled.
const MAX_PUMP_PASSES: usize = 10_000;

/// Lifetime of simulated blocks.
const BLOCK_TTL: Duration = Duration::from_secs(3600);

/// Shape of a simulation run.
#[derive(Debug, Clone)]
pub(crate) struct SimulationParams {
    pub(crate) nodes: usize,
    pub(crate) degree: usize,
    pub(crate) blocks: usize,
    pub(crate) replication: u32,
    pub(crate) queue_capacity: usize,
    pub(crate) seed: u64,
}

struct Node {
    router: MessageRouter,
    deliveries: mpsc::UnboundedReceiver<LocalDelivery>,
}

/// One direction of a connection.
struct Link {
    from: usize,
    to: usize,
    rx: mpsc::Receiver<DhtMessage>,
}

pub(crate) struct Simulation {
    nodes: Vec<Node>,
    links: Vec<Link>,
    rng: StdRng,
    codec: DhtCodec,
    buffer: BytesMut,
    violations: u64,
}

/// Outcome of [`Simulation::run`].
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub(crate) struct Report {
    pub(crate) nodes: usize,
    pub(crate) links: usize,
    pub(crate) blocks: usize,
    pub(crate) found: usize,
    pub(crate) hellos_learned: u64,
    pub(crate) puts_stored: u64,
    pub(crate) puts_forwarded: u64,
    pub(crate) gets_forwarded: u64,
    pub(crate) results_forwarded: u64,
    pub(crate) duplicate_replies: u64,
    pub(crate) queue_full_drops: u64,
    pub(crate) protocol_violations: u64,
}

impl Simulation {
    /// Create the nodes and dial `params.degree` random neighbours from each.
    pub(crate) fn new(
        params: &SimulationParams,
        routing: RoutingConfig,
        router: RouterConfig,
    ) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(params.seed);
        let network_size = (params.nodes as f64).log2();

        let mut nodes = Vec::with_capacity(params.nodes);
        for i in 0..params.nodes {
            let id = Identifier::random(&mut rng);
            let hello = Hello::new(id, format!("sim://node/{i}").into_bytes());
            let (clients, deliveries) = mpsc::unbounded_channel();
            let services = RouterServices::new(
                MemoryContentStore::default(),
                FixedNetworkSize(network_size),
            )
            .with_hellos(HelloBook::new(hello))
            .with_clients(clients);
            let router = MessageRouter::new(id, routing.clone(), router.clone(), services)
                .with_rng(StdRng::seed_from_u64(rng.random()));
            nodes.push(Node { router, deliveries });
        }

        let mut simulation = Self {
            nodes,
            links: Vec::new(),
            rng,
            codec: DhtCodec,
            buffer: BytesMut::new(),
            violations: 0,
        };
        for from in 0..params.nodes {
            let picks = index::sample(&mut simulation.rng, params.nodes - 1, params.degree);
            for pick in picks {
                let to = if pick >= from { pick + 1 } else { pick };
                simulation.connect(from, to, params.queue_capacity)?;
            }
        }
        info!(
            nodes = simulation.nodes.len(),
            links = simulation.links.len(),
            network_size,
            "network built"
        );
        Ok(simulation)
    }

    fn connect(&mut self, a: usize, b: usize, capacity: usize) -> Result<()> {
        if self.links.iter().any(|l| l.from == a && l.to == b) {
            return Ok(());
        }
        for (from, to) in [(a, b), (b, a)] {
            let peer = self.id(to)?;
            let (queue, rx) = OutboundQueue::bounded(capacity);
            self.node(from)?
                .router
                .on_connected(peer, queue)
                .wrap_err("connecting simulated nodes")?;
            self.links.push(Link { from, to, rx });
        }
        Ok(())
    }

    fn id(&self, node: usize) -> Result<Identifier> {
        self.nodes
            .get(node)
            .map(|n| *n.router.local())
            .ok_or_else(|| eyre::eyre!("no node {node}"))
    }

    fn node(&mut self, node: usize) -> Result<&mut Node> {
        self.nodes
            .get_mut(node)
            .ok_or_else(|| eyre::eyre!("no node {node}"))
    }

    /// Bootstrap with one FIND-PEER round per node, store `params.blocks`
    /// blocks from random nodes and fetch each from another random node.
    pub(crate) fn run(&mut self, params: &SimulationParams) -> Result<Report> {
        for node in &mut self.nodes {
            node.router.find_peer_round();
        }
        let passes = self.pump()?;
        debug!(passes, "bootstrap settled");

        let expiration = SystemTime::now() + BLOCK_TTL;
        let mut keys = Vec::with_capacity(params.blocks);
        for i in 0..params.blocks {
            let payload = Bytes::from(format!("simulated block {i}"));
            let block = Block {
                key: Identifier::digest(&payload),
                block_type: BlockType::TEST,
                expiration,
                put_path: PeerPath::new(),
                payload,
            };
            keys.push(block.key);
            let origin = self.rng.random_range(0..self.nodes.len());
            self.node(origin)?
                .router
                .put(block, RouteOptions::RECORD_ROUTE, params.replication)?;
            self.pump()?;
        }
        self.drain_deliveries();

        let mut found = 0;
        for key in keys {
            let origin = self.rng.random_range(0..self.nodes.len());
            let node = self.node(origin)?;
            node.router.get(
                key,
                BlockType::TEST,
                RouteOptions::RECORD_ROUTE,
                params.replication,
                Bytes::new(),
            )?;
            self.pump()?;

            let node = self.node(origin)?;
            let hit = std::iter::from_fn(|| node.deliveries.try_recv().ok())
                .fold(false, |hit, delivery| hit || delivery.block.key == key);
            if hit {
                found += 1;
            } else {
                debug!(%key, origin, "lookup found nothing");
            }
        }

        for node in &self.nodes {
            let stats = node.router.stats();
            debug!(
                node = %node.router.local(),
                peers = node.router.table().peer_count(),
                pending = node.router.pending_len(),
                puts_stored = stats.puts_stored,
                results_forwarded = stats.results_forwarded,
                "node statistics"
            );
        }
        let totals = self.totals();
        let report = Report {
            nodes: self.nodes.len(),
            links: self.links.len(),
            blocks: params.blocks,
            found,
            hellos_learned: totals.hellos_learned,
            puts_stored: totals.puts_stored,
            puts_forwarded: totals.puts_forwarded,
            gets_forwarded: totals.gets_forwarded,
            results_forwarded: totals.results_forwarded,
            duplicate_replies: totals.duplicate_replies,
            queue_full_drops: totals.queue_full_drops,
            protocol_violations: self.violations,
        };
        info!(found, blocks = params.blocks, "simulation finished");
        Ok(report)
    }

    /// Move queued messages to their receivers until every queue is empty.
    /// Returns the number of passes it took.
    fn pump(&mut self) -> Result<usize> {
        for pass in 1..=MAX_PUMP_PASSES {
            let mut moved = Vec::new();
            for link in &mut self.links {
                while let Ok(message) = link.rx.try_recv() {
                    moved.push((link.from, link.to, message));
                }
            }
            if moved.is_empty() {
                return Ok(pass);
            }

            for (from, to, message) in moved {
                let sender = self.id(from)?;
                let message = self.reframe(message)?;
                let router = &mut self.node(to)?.router;
                if let Err(err) = router.dispatch(Event::message(sender, message)) {
                    if err.is_violation() {
                        self.violations += 1;
                    }
                    warn!(%sender, %err, "message rejected");
                }
            }
        }
        eyre::bail!("network did not settle after {MAX_PUMP_PASSES} passes")
    }

    fn reframe(&mut self, message: DhtMessage) -> Result<DhtMessage> {
        self.codec.encode(message, &mut self.buffer)?;
        self.codec
            .decode(&mut self.buffer)?
            .ok_or_else(|| eyre::eyre!("incomplete frame after encoding"))
    }

    fn drain_deliveries(&mut self) {
        for node in &mut self.nodes {
            while node.deliveries.try_recv().is_ok() {}
        }
    }

    fn totals(&self) -> RouterStats {
        self.nodes
            .iter()
            .map(|n| n.router.stats())
            .fold(RouterStats::default(), |mut acc, s| {
                acc.hellos_learned += s.hellos_learned;
                acc.puts_stored += s.puts_stored;
                acc.puts_forwarded += s.puts_forwarded;
                acc.gets_forwarded += s.gets_forwarded;
                acc.results_forwarded += s.results_forwarded;
                acc.duplicate_replies += s.duplicate_replies;
                acc.queue_full_drops += s.queue_full_drops;
                acc
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(seed: u64) -> SimulationParams {
        SimulationParams {
            nodes: 24,
            degree: 4,
            blocks: 8,
            replication: 4,
            queue_capacity: 256,
            seed,
        }
    }

    fn run(seed: u64) -> Report {
        let params = params(seed);
        Simulation::new(&params, RoutingConfig::default(), RouterConfig::default())
            .unwrap()
            .run(&params)
            .unwrap()
    }

    #[test]
    fn test_simulation_is_connected_both_ways() {
        let params = params(7);
        let simulation =
            Simulation::new(&params, RoutingConfig::default(), RouterConfig::default()).unwrap();
        assert_eq!(simulation.links.len() % 2, 0);
        for link in &simulation.links {
            assert!(simulation.links.iter().any(|l| l.from == link.to && l.to == link.from));
        }
    }

    #[test]
    fn test_simulation_stores_and_forwards() {
        let report = run(3);
        assert_eq!(report.nodes, 24);
        assert_eq!(report.blocks, 8);
        assert!(report.puts_stored >= 8);
        assert!(report.puts_forwarded > 0);
        assert_eq!(report.protocol_violations, 0);
        assert!(report.found <= report.blocks);
    }

    #[test]
    fn test_simulation_is_reproducible_from_seed() {
        let a = run(11);
        let b = run(11);
        assert_eq!(a.links, b.links);
        assert_eq!(a.puts_stored, b.puts_stored);
        assert_eq!(a.found, b.found);
    }
}
