//! Bucketed table of directly connected peers.
//!
//! Bucket `i` holds the peers that share exactly `BUCKET_COUNT - i - 1`
//! leading bits with the local identity, in connection order. Each peer is
//! recorded in one bucket and in an index from identity to bucket, and both are
//! updated together on every connect and disconnect.

use std::collections::HashMap;

use tracing::{debug, trace};
use vertex_dht_primitives::{BUCKET_COUNT, Identifier, PeerFilter, bucket_index, matching_bits};

use crate::{RoutingConfig, RoutingError, metrics::RoutingMetrics};

/// A directly connected peer and the link used to reach it.
///
/// `L` is whatever the caller needs to send to the peer, typically a handle to
/// its outbound queue.
#[derive(Clone, Debug)]
pub struct PeerHandle<L> {
    id: Identifier,
    link: L,
}

impl<L> PeerHandle<L> {
    pub const fn id(&self) -> &Identifier {
        &self.id
    }

    pub const fn link(&self) -> &L {
        &self.link
    }
}

#[derive(Debug)]
struct PeerEntry<L> {
    handle: PeerHandle<L>,
    bucket: usize,
}

/// Kademlia routing table.
#[derive(Debug)]
pub struct RoutingTable<L> {
    local: Identifier,
    config: RoutingConfig,
    buckets: Vec<Vec<Identifier>>,
    peers: HashMap<Identifier, PeerEntry<L>>,
    closest_bucket: usize,
    metrics: RoutingMetrics,
}

impl<L> RoutingTable<L> {
    pub fn new(local: Identifier, config: RoutingConfig) -> Self {
        Self {
            local,
            config,
            buckets: vec![Vec::new(); BUCKET_COUNT],
            peers: HashMap::new(),
            closest_bucket: 0,
            metrics: RoutingMetrics::default(),
        }
    }

    pub const fn local(&self) -> &Identifier {
        &self.local
    }

    pub const fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Number of peers per bucket that take part in routing (`K`).
    pub const fn bucket_size(&self) -> usize {
        self.config.bucket_size
    }

    pub(crate) const fn metrics(&self) -> &RoutingMetrics {
        &self.metrics
    }

    /// Record a new connection and return the bucket the peer landed in.
    pub fn on_connect(&mut self, id: Identifier, link: L) -> Result<usize, RoutingError> {
        let bucket = bucket_index(&self.local, &id).ok_or(RoutingError::SelfConnect)?;
        if self.peers.contains_key(&id) {
            return Err(RoutingError::AlreadyConnected(id));
        }

        let slot = self
            .buckets
            .get_mut(bucket)
            .ok_or(RoutingError::SelfConnect)?;
        slot.push(id);
        let occupancy = slot.len();
        self.peers.insert(
            id,
            PeerEntry {
                handle: PeerHandle { id, link },
                bucket,
            },
        );
        self.closest_bucket = self.closest_bucket.max(bucket);
        self.metrics.peers_connected_total.increment(1);

        debug!(peer = %id, bucket, occupancy, closest = self.closest_bucket, "peer added to routing table");
        Ok(bucket)
    }

    /// Remove a peer and return its handle.
    ///
    /// # Panics
    ///
    /// If the peer is indexed under a bucket that does not contain it, which
    /// means the table has been corrupted.
    pub fn on_disconnect(&mut self, id: &Identifier) -> Result<PeerHandle<L>, RoutingError> {
        let entry = self
            .peers
            .remove(id)
            .ok_or(RoutingError::UnknownPeer(*id))?;

        let slot = self.buckets.get_mut(entry.bucket);
        let position = slot
            .as_ref()
            .and_then(|s| s.iter().position(|p| p == id));
        assert!(
            position.is_some(),
            "routing table inconsistent: peer {id} indexed under bucket {} but not present in it",
            entry.bucket
        );
        if let (Some(slot), Some(position)) = (slot, position) {
            slot.remove(position);
        }

        while self.closest_bucket > 0 && self.bucket_len(self.closest_bucket) == 0 {
            self.closest_bucket -= 1;
        }
        self.metrics.peers_disconnected_total.increment(1);

        debug!(peer = %id, bucket = entry.bucket, closest = self.closest_bucket, "peer removed from routing table");
        Ok(entry.handle)
    }

    /// Whether the local node should consider itself the closest peer to `key`.
    ///
    /// Only the routing window of the bucket `key` falls into can hold closer
    /// peers. Any of them matching more bits of `key` than the local identity
    /// does, excluded by `filter` or not, makes the answer `false`.
    pub fn is_locally_closest(&self, key: &Identifier, filter: &PeerFilter) -> bool {
        let Some(bucket) = bucket_index(&self.local, key) else {
            return true;
        };
        let bits = matching_bits(&self.local, key);

        for peer in self.routing_window(bucket) {
            if matching_bits(peer.id(), key) > bits {
                trace!(%key, peer = %peer.id(), excluded = filter.contains(peer.id()), "closer peer known");
                return false;
            }
        }
        true
    }

    /// Every peer in bucket `index`, in connection order.
    pub fn peers_in_bucket(&self, index: usize) -> impl Iterator<Item = &PeerHandle<L>> + '_ {
        self.buckets
            .get(index)
            .into_iter()
            .flatten()
            .filter_map(|id| self.peers.get(id).map(|entry| &entry.handle))
    }

    /// The first `K` peers of bucket `index`, the only ones routing looks at.
    pub fn routing_window(&self, index: usize) -> impl Iterator<Item = &PeerHandle<L>> + '_ {
        self.peers_in_bucket(index).take(self.config.bucket_size)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn bucket_for(&self, id: &Identifier) -> Option<usize> {
        self.peers.get(id).map(|entry| entry.bucket)
    }

    pub fn bucket_len(&self, index: usize) -> usize {
        self.buckets.get(index).map_or(0, Vec::len)
    }

    /// Highest-index non-empty bucket, or `0` when the table is empty.
    pub const fn closest_bucket(&self) -> usize {
        self.closest_bucket
    }

    pub fn peer(&self, id: &Identifier) -> Option<&PeerHandle<L>> {
        self.peers.get(id).map(|entry| &entry.handle)
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.peers.contains_key(id)
    }

    /// All connected peers, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &PeerHandle<L>> + '_ {
        self.peers.values().map(|entry| &entry.handle)
    }
}
