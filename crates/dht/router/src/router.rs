//! Request routing.
//!
//! [`MessageRouter`] owns the routing table, the reverse-path table and the
//! connectivity advisor. It is driven one event at a time and never blocks:
//! every outbound message goes through [`OutboundQueue::try_enqueue`].

use std::time::SystemTime;

use bytes::Bytes;
use rand::{Rng, RngCore, SeedableRng, rngs::StdRng};
use tokio::{sync::broadcast, time::Instant};
use tracing::{debug, trace, warn};
use vertex_dht_primitives::{
    BlockType, Hello, Identifier, PeerFilter, PeerPath, ReplyFilter, RouteOptions, bucket_index,
};
use vertex_dht_routing::{ConnectivityAdvisor, PeerHandle, PeerSelector, RoutingConfig, RoutingTable};
use vertex_dht_wire::{DhtMessage, GetMessage, MAX_MESSAGE_SIZE, PutMessage, ResultMessage, WireError};

use crate::{
    Block, EnqueueError, Event, KeyDerivation, LookupEvaluation, OutboundQueue, PendingGet, Query,
    ReplyEvaluation, RequestEvaluation, Requester, RouteEvent, RouterConfig, RouterError,
    RouterServices, RouterStats, Violation,
    metrics::Counters,
    pending::PendingTable,
};

/// Where a reply being routed came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReplySource {
    Peer(Identifier),
    LocalStore,
}

/// The DHT message router of one node.
pub struct MessageRouter {
    pub(crate) table: RoutingTable<OutboundQueue>,
    advisor: ConnectivityAdvisor,
    pending: PendingTable,
    pub(crate) services: RouterServices,
    pub(crate) config: RouterConfig,
    pub(crate) rng: Box<dyn RngCore + Send>,
    pub(crate) counters: Counters,
    monitor: broadcast::Sender<RouteEvent>,
    /// Peers that filled a gap in the table since the last FIND-PEER round.
    pub(crate) newly_found: usize,
}

impl MessageRouter {
    pub fn new(
        local: Identifier,
        routing: RoutingConfig,
        config: RouterConfig,
        services: RouterServices,
    ) -> Self {
        let (monitor, _) = broadcast::channel(config.monitor_capacity.max(1));
        Self {
            table: RoutingTable::new(local, routing),
            advisor: ConnectivityAdvisor::new(),
            pending: PendingTable::new(config.pending_capacity),
            services,
            config,
            rng: Box::new(StdRng::from_os_rng()),
            counters: Counters::default(),
            monitor,
            newly_found: 0,
        }
    }

    /// Replace the random source, e.g. with a seeded one.
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    pub const fn local(&self) -> &Identifier {
        self.table.local()
    }

    pub const fn table(&self) -> &RoutingTable<OutboundQueue> {
        &self.table
    }

    pub const fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub const fn advisor(&self) -> &ConnectivityAdvisor {
        &self.advisor
    }

    pub const fn stats(&self) -> RouterStats {
        self.counters.snapshot()
    }

    /// Number of GETs waiting for replies.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Receive a [`RouteEvent`] for every request handled from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RouteEvent> {
        self.monitor.subscribe()
    }

    pub fn is_locally_closest(&self, key: &Identifier, filter: &PeerFilter) -> bool {
        self.table.is_locally_closest(key, filter)
    }

    /// Handle one event.
    pub fn dispatch(&mut self, event: Event) -> Result<(), RouterError> {
        match event {
            Event::Connected(peer, queue) => self.on_connected(peer, queue).map(drop),
            Event::Disconnected(peer) => self.on_disconnected(&peer),
            Event::Put { sender, message } => self.handle_put(sender, message).map(drop),
            Event::Get { sender, message } => self.handle_get(sender, message).map(drop),
            Event::Result { sender, message } => self.handle_result(sender, message),
            Event::LocalReply(block) => {
                self.route_reply(ReplySource::LocalStore, &block, &PeerPath::new());
                Ok(())
            }
        }
    }

    /// Add a neighbour. Returns its bucket.
    pub fn on_connected(&mut self, peer: Identifier, queue: OutboundQueue) -> Result<usize, RouterError> {
        let bucket = self.table.on_connect(peer, queue)?;
        if bucket > 0 && self.table.bucket_len(bucket) <= self.table.bucket_size() {
            self.newly_found += 1;
            self.advisor
                .desire(&self.table, peer, &mut *self.services.connectivity);
        }
        self.advisor
            .reevaluate(&self.table, &mut *self.services.connectivity);
        debug!(%peer, bucket, peers = self.table.peer_count(), "neighbour connected");
        Ok(bucket)
    }

    pub fn on_disconnected(&mut self, peer: &Identifier) -> Result<(), RouterError> {
        let handle = self.table.on_disconnect(peer)?;
        let forgotten = self.pending.remove_peer(handle.id());
        self.advisor
            .reevaluate(&self.table, &mut *self.services.connectivity);
        debug!(%peer, forgotten, peers = self.table.peer_count(), "neighbour disconnected");
        Ok(())
    }

    /// Handle a PUT from a neighbour. Returns whether any peer took it further.
    pub fn handle_put(&mut self, sender: Identifier, message: PutMessage) -> Result<bool, RouterError> {
        self.counters.puts_received(1);
        self.route_put(Some(sender), message)
    }

    /// Store a block locally and route it towards the peers closest to its
    /// key.
    pub fn put(
        &mut self,
        block: Block,
        options: RouteOptions,
        desired_replication: u32,
    ) -> Result<bool, RouterError> {
        self.counters.puts_received(1);
        let message = PutMessage {
            options,
            block_type: block.block_type,
            hop_count: 0,
            desired_replication,
            expiration: block.expiration,
            peer_filter: PeerFilter::new(),
            key: block.key,
            put_path: PeerPath::new(),
            payload: block.payload,
        };
        self.route_put(None, message)
    }

    fn route_put(&mut self, sender: Option<Identifier>, mut message: PutMessage) -> Result<bool, RouterError> {
        let key = message.key;
        if message.expiration <= SystemTime::now() {
            self.counters.puts_expired(1);
            debug!(%key, hop_count = message.hop_count, "dropping expired PUT");
            return Ok(false);
        }

        match self
            .services
            .evaluator
            .derive_key(message.block_type, &message.payload)
        {
            KeyDerivation::Derived(derived) if derived != key => {
                return Err(self.reject(sender, Violation::KeyMismatch));
            }
            KeyDerivation::Invalid => return Err(self.reject(sender, Violation::InvalidBlock)),
            KeyDerivation::Derived(_) | KeyDerivation::Unknown => {}
        }

        let local = *self.table.local();
        if message.options.record_route() {
            message.put_path.record(local);
        } else {
            message.put_path.clear();
        }
        if let Err(err) = message.fit_to_size() {
            self.counters.oversized_drops(1);
            return Err(err.into());
        }

        let closest = sender.is_none()
            || message.options.demultiplex_everywhere()
            || self.table.is_locally_closest(&key, &message.peer_filter);
        if closest {
            let block = Block {
                key,
                block_type: message.block_type,
                expiration: message.expiration,
                put_path: message.put_path.clone(),
                payload: message.payload.clone(),
            };
            self.services.clients.deliver(&block, &PeerPath::new());
            self.services.store.put(block);
            self.counters.puts_stored(1);
        }

        let received_hops = message.hop_count;
        message.hop_count = received_hops.saturating_add(1);
        message.peer_filter.insert(&local);
        let targets = self.select_targets(
            &key,
            &mut message.peer_filter,
            message.hop_count,
            message.desired_replication,
        );

        let mut forwarded = 0u64;
        for target in &targets {
            if Self::enqueue(&mut self.counters, target, DhtMessage::Put(message.clone())) {
                forwarded += 1;
            }
        }
        self.counters.puts_forwarded(forwarded);
        trace!(%key, hop_count = received_hops, closest, targets = targets.len(), forwarded, "routed PUT");

        self.publish(RouteEvent::Put {
            key,
            block_type: message.block_type,
            hop_count: received_hops,
            put_path_len: message.put_path.len(),
            last_hop: forwarded == 0,
        });
        Ok(forwarded > 0)
    }

    /// Handle a GET from a neighbour. Returns the number of peers it was
    /// forwarded to.
    pub fn handle_get(&mut self, sender: Identifier, message: GetMessage) -> Result<usize, RouterError> {
        self.counters.gets_received(1);
        self.route_get(Requester::Peer(sender), message)
    }

    /// Look up `key` on behalf of local clients.
    ///
    /// Matches found in the local store are delivered right away; the request
    /// goes out to the network unless they fully answer it.
    pub fn get(
        &mut self,
        key: Identifier,
        block_type: BlockType,
        options: RouteOptions,
        desired_replication: u32,
        xquery: Bytes,
    ) -> Result<usize, RouterError> {
        self.counters.gets_received(1);
        let message = GetMessage {
            options,
            block_type,
            hop_count: 0,
            desired_replication,
            peer_filter: PeerFilter::new(),
            key,
            xquery,
            reply_filter: ReplyFilter::empty(self.rng.random()),
        };
        self.route_get(Requester::Local, message)
    }

    pub(crate) fn route_get(
        &mut self,
        requester: Requester,
        mut message: GetMessage,
    ) -> Result<usize, RouterError> {
        let key = message.key;
        match self.services.evaluator.evaluate_request(
            message.block_type,
            &key,
            &message.xquery,
            &message.reply_filter,
        ) {
            RequestEvaluation::Valid => {}
            RequestEvaluation::Invalid => {
                return Err(self.reject(requester.peer().copied(), Violation::InvalidRequest));
            }
            RequestEvaluation::TypeNotSupported => {
                self.counters.gets_unsupported(1);
                debug!(%key, block_type = %message.block_type, "dropping GET for unsupported block type");
                return Ok(0);
            }
        }
        if message.encoded_len() > MAX_MESSAGE_SIZE {
            self.counters.oversized_drops(1);
            return Err(WireError::Oversized(message.encoded_len()).into());
        }

        let evicted = self.pending.register(
            key,
            requester,
            PendingGet::new(message.block_type, message.xquery.clone(), message.reply_filter.clone()),
        );
        self.counters.pending_evicted(evicted as u64);

        let closest = message.options.demultiplex_everywhere()
            || self.table.is_locally_closest(&key, &message.peer_filter);
        let mut answered = false;
        if message.options.find_peer() {
            if closest && let Requester::Peer(sender) = requester {
                self.handle_find_peer(&sender, &key, &message.reply_filter);
            }
        } else if closest || requester == Requester::Local {
            answered = self.lookup_local(requester, &message);
        }

        let received_hops = message.hop_count;
        let mut forwarded = 0;
        if answered {
            trace!(%key, "answered locally, not forwarding GET");
        } else {
            if let Some(pending) = self.pending.get(&key, &requester) {
                message.reply_filter = pending.reply_filter.clone();
            }
            message.hop_count = received_hops.saturating_add(1);
            message.peer_filter.insert(self.table.local());
            let targets = self.select_targets(
                &key,
                &mut message.peer_filter,
                message.hop_count,
                message.desired_replication,
            );
            for target in &targets {
                if Self::enqueue(&mut self.counters, target, DhtMessage::Get(message.clone())) {
                    forwarded += 1;
                }
            }
            self.counters.gets_forwarded(forwarded as u64);
            trace!(%key, hop_count = received_hops, closest, targets = targets.len(), forwarded, "routed GET");
        }

        self.publish(RouteEvent::Get {
            key,
            block_type: message.block_type,
            hop_count: received_hops,
            forwarded,
        });
        Ok(forwarded)
    }

    /// Answer `message` from the local store. Returns whether the request was
    /// fully answered.
    fn lookup_local(&mut self, requester: Requester, message: &GetMessage) -> bool {
        let lookup = self.services.store.get(&Query {
            key: &message.key,
            block_type: message.block_type,
            xquery: &message.xquery,
            reply_filter: &message.reply_filter,
        });
        for block in &lookup.blocks {
            self.route_reply(ReplySource::LocalStore, block, &PeerPath::new());
        }
        lookup.evaluation == LookupEvaluation::OkLast
            || !self.pending.contains(&message.key, &requester)
    }

    /// Handle a RESULT travelling back towards a requester.
    pub fn handle_result(&mut self, sender: Identifier, message: ResultMessage) -> Result<(), RouterError> {
        self.counters.results_received(1);
        if message.expiration <= SystemTime::now() {
            self.counters.results_expired(1);
            debug!(key = %message.key, "dropping expired RESULT");
            return Ok(());
        }

        if message.block_type.is_hello() {
            match Hello::decode(&message.payload) {
                Ok(hello) => self.learn_hello(&hello),
                Err(_) => return Err(self.reject(Some(sender), Violation::InvalidHello)),
            }
        }

        let ResultMessage {
            block_type,
            expiration,
            key,
            put_path,
            mut get_path,
            payload,
        } = message;
        get_path.record(sender);

        let block = Block {
            key,
            block_type,
            expiration,
            put_path,
            payload,
        };
        self.services.clients.deliver(&block, &get_path);
        if self.config.cache_results {
            self.services.store.put(block.clone());
        }
        self.route_reply(ReplySource::Peer(sender), &block, &get_path);

        self.publish(RouteEvent::Result {
            key,
            block_type,
            get_path_len: get_path.len(),
        });
        Ok(())
    }

    /// Remember a HELLO found in a RESULT, offer it if its bucket has room and
    /// let the advisor weigh a connection to it.
    fn learn_hello(&mut self, hello: &Hello) {
        let local = *self.table.local();
        let peer = *hello.peer();
        if peer == local || self.table.contains(&peer) {
            return;
        }
        self.services.hellos.remember(hello);
        self.counters.hellos_learned(1);

        let Some(bucket) = bucket_index(&local, &peer) else {
            return;
        };
        if self.table.bucket_len(bucket) < self.table.bucket_size() {
            trace!(%peer, bucket, "offering HELLO for under-filled bucket");
            self.services.connectivity.offer_hello(hello);
        }
        self.advisor
            .desire(&self.table, peer, &mut *self.services.connectivity);
    }

    /// Send `block` to every requester waiting for its key that has not seen
    /// it yet.
    pub(crate) fn route_reply(&mut self, source: ReplySource, block: &Block, get_path: &PeerPath) {
        let now = Instant::now();
        let timeout = self.config.get_timeout;
        let from = match source {
            ReplySource::Peer(peer) => Some(peer),
            ReplySource::LocalStore => None,
        };

        let mut waiting = 0usize;
        let mut targets = Vec::new();
        let mut expired = Vec::new();
        let mut answered = Vec::new();
        for (requester, pending) in self.pending.waiting_for(&block.key) {
            waiting += 1;
            if now.saturating_duration_since(pending.registered) > timeout {
                expired.push(requester);
                continue;
            }
            if from.is_some() && requester.peer() == from.as_ref() {
                continue;
            }
            if !pending.accepts(block.block_type) {
                continue;
            }
            match self.services.evaluator.evaluate_reply(
                block.block_type,
                &block.key,
                &pending.xquery,
                &mut pending.reply_filter,
                &block.payload,
            ) {
                ReplyEvaluation::OkMore => targets.push(requester),
                ReplyEvaluation::OkLast => {
                    targets.push(requester);
                    answered.push(requester);
                }
                ReplyEvaluation::Duplicate => self.counters.duplicate_replies(1),
                ReplyEvaluation::Irrelevant => {}
                ReplyEvaluation::Invalid => {
                    debug!(key = %block.key, block_type = %block.block_type, "reply rejected by evaluator");
                }
            }
        }

        for requester in expired.iter().chain(&answered) {
            self.pending.retire(&block.key, requester);
        }
        self.counters.pending_expired(expired.len() as u64);
        if waiting == 0 {
            self.counters.unroutable_replies(1);
            trace!(key = %block.key, "no pending request for reply");
            return;
        }

        for requester in targets {
            match requester {
                Requester::Local => {
                    if source == ReplySource::LocalStore {
                        self.services.clients.deliver(block, get_path);
                    }
                    self.counters.results_delivered_locally(1);
                }
                Requester::Peer(peer) => {
                    let mut result = ResultMessage {
                        block_type: block.block_type,
                        expiration: block.expiration,
                        key: block.key,
                        put_path: block.put_path.clone(),
                        get_path: get_path.clone(),
                        payload: block.payload.clone(),
                    };
                    if let Err(err) = result.fit_to_size() {
                        self.counters.oversized_drops(1);
                        debug!(%err, key = %block.key, "dropping oversized RESULT");
                        continue;
                    }
                    if self.send_to(&peer, DhtMessage::Result(result)) {
                        self.counters.results_forwarded(1);
                    }
                }
            }
        }
    }

    pub(crate) fn select_targets(
        &mut self,
        key: &Identifier,
        filter: &mut PeerFilter,
        hop_count: u32,
        desired_replication: u32,
    ) -> Vec<PeerHandle<OutboundQueue>> {
        let network_size = self.services.network_size.log_estimate();
        PeerSelector::new(&self.table, network_size).select_targets(
            key,
            filter,
            hop_count,
            desired_replication,
            &mut *self.rng,
        )
    }

    /// Queue `message` for a connected peer.
    pub(crate) fn send_to(&mut self, peer: &Identifier, message: DhtMessage) -> bool {
        match self.table.peer(peer) {
            Some(handle) => Self::enqueue(&mut self.counters, handle, message),
            None => {
                self.counters.disconnected_drops(1);
                trace!(%peer, "target no longer connected");
                false
            }
        }
    }

    fn enqueue(counters: &mut Counters, target: &PeerHandle<OutboundQueue>, message: DhtMessage) -> bool {
        match target.link().try_enqueue(message) {
            Ok(()) => true,
            Err(EnqueueError::Full) => {
                counters.queue_full_drops(1);
                debug!(peer = %target.id(), "outbound queue full, dropping message");
                false
            }
            Err(EnqueueError::Closed) => {
                counters.disconnected_drops(1);
                trace!(peer = %target.id(), "outbound queue closed");
                false
            }
        }
    }

    /// Count and log a malformed message. `None` stands for a local client.
    fn reject(&mut self, peer: Option<Identifier>, reason: Violation) -> RouterError {
        match peer {
            Some(peer) => {
                self.counters.protocol_violations(1);
                warn!(target: "dht::breach", %peer, %reason, "protocol violation");
                RouterError::ProtocolViolation { peer, reason }
            }
            None => RouterError::Rejected(reason),
        }
    }

    fn publish(&self, event: RouteEvent) {
        // no subscribers is fine
        let _ = self.monitor.send(event);
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("local", self.table.local())
            .field("peers", &self.table.peer_count())
            .field("pending", &self.pending.len())
            .field("desired", &self.advisor.len())
            .finish_non_exhaustive()
    }
}
