//! Peer discovery.
//!
//! Each node periodically sends a GET for its own identity with the FIND-PEER
//! flag set. Nodes close to that identity answer with their own HELLO and the
//! HELLO of one random peer from the bucket best matching the key, which the
//! requester then passes on to the networking layer.

use std::time::{Duration, SystemTime};

use bytes::Bytes;
use rand::Rng;
use tracing::{debug, trace, warn};
use vertex_dht_primitives::{
    BlockType, Hello, Identifier, PeerFilter, PeerPath, ReplyFilter, RouteOptions, bucket_index,
};
use vertex_dht_wire::{DhtMessage, GetMessage, ResultMessage};

use crate::{MessageRouter, Requester};

impl MessageRouter {
    /// Answer a FIND-PEER request for `key` from `sender`.
    ///
    /// HELLOs of identities in `reply_filter` are not sent again.
    pub(crate) fn handle_find_peer(
        &mut self,
        sender: &Identifier,
        key: &Identifier,
        reply_filter: &ReplyFilter,
    ) {
        let local = *self.table.local();
        let expiration = SystemTime::now() + self.config.hello_expiration;

        if reply_filter.contains(&local) {
            trace!(%sender, "requester already knows our HELLO");
        } else if let Some(hello) = self.services.hellos.local_hello() {
            self.send_hello(sender, key, &hello, expiration);
        }

        let closest = self.table.closest_bucket();
        let bucket = if *key == local {
            closest
        } else {
            bucket_index(&local, key).map_or(closest, |bucket| bucket.min(closest))
        };
        let peers: Vec<Identifier> = self
            .table
            .peers_in_bucket(bucket)
            .map(|peer| *peer.id())
            .collect();
        if peers.is_empty() {
            return;
        }

        let start = self.rng.random_range(0..peers.len());
        let hellos = &self.services.hellos;
        let chosen = peers
            .iter()
            .cycle()
            .skip(start)
            .take(peers.len())
            .filter(|peer| !reply_filter.contains(peer))
            .find_map(|peer| hellos.hello_for(peer));

        match chosen {
            Some(hello) => self.send_hello(sender, key, &hello, expiration),
            None => trace!(%sender, bucket, "no HELLO left to offer from bucket"),
        }
    }

    fn send_hello(&mut self, target: &Identifier, key: &Identifier, hello: &Hello, expiration: SystemTime) {
        let result = ResultMessage {
            block_type: BlockType::HELLO,
            expiration,
            key: *key,
            put_path: PeerPath::new(),
            get_path: PeerPath::new(),
            payload: hello.encode(),
        };
        if self.send_to(target, DhtMessage::Result(result)) {
            self.counters.hellos_sent(1);
            trace!(%target, peer = %hello.peer(), "sent HELLO");
        }
    }

    /// Run one FIND-PEER round and return the delay until the next one.
    ///
    /// A round is skipped when more than a bucket's worth of peers filled gaps
    /// in the table since the previous one. Otherwise the next round follows
    /// after the minimum interval plus a random share of the maximum that
    /// shrinks as more new peers were found.
    pub fn find_peer_round(&mut self) -> Duration {
        let newly_found = std::mem::take(&mut self.newly_found);
        if newly_found > self.table.bucket_size() {
            self.counters.find_peer_skipped(1);
            debug!(newly_found, "enough new peers recently, skipping FIND-PEER round");
            return self.config.find_peer_busy_backoff;
        }

        let forwarded = self.send_find_peer();
        let max = self.config.find_peer_max_interval;
        let spread = u64::try_from(max.as_millis()).unwrap_or(u64::MAX) / (newly_found as u64 + 1);
        let jitter = if spread == 0 {
            0
        } else {
            self.rng.random_range(0..spread)
        };
        let delay = (self.config.find_peer_min_interval + Duration::from_millis(jitter)).min(max);
        debug!(forwarded, newly_found, ?delay, "sent FIND-PEER request");
        delay
    }

    /// Send a FIND-PEER request for the local identity. Returns the number of
    /// peers it went to.
    pub fn send_find_peer(&mut self) -> usize {
        let local = *self.table.local();
        let mut reply_filter = ReplyFilter::with_capacity(self.rng.random(), self.table.peer_count());
        for peer in self.table.iter() {
            reply_filter.insert(peer.id());
        }

        let message = GetMessage {
            options: RouteOptions::FIND_PEER,
            block_type: BlockType::HELLO,
            hop_count: 0,
            desired_replication: self.config.find_peer_replication,
            peer_filter: PeerFilter::new(),
            key: local,
            xquery: Bytes::new(),
            reply_filter,
        };
        self.counters.find_peer_rounds(1);
        match self.route_get(Requester::Local, message) {
            Ok(forwarded) => forwarded,
            Err(err) => {
                warn!(%err, "FIND-PEER request not sent");
                0
            }
        }
    }
}
