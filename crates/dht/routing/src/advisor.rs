//! Connection preferences handed to the networking layer.
//!
//! Every identity the node would like to be (or stay) connected to is tracked
//! with a strength derived from how full its bucket is. Strengths are
//! recomputed after each change in bucket occupancy, and a change is passed on
//! to the networking layer through [`Connectivity`].

use std::collections::HashMap;

use tracing::{debug, trace};
use vertex_dht_primitives::{Hello, Identifier, bucket_index};

use crate::RoutingTable;

/// Networking-layer hooks for connection management.
pub trait Connectivity: Send {
    /// Ask for a connection to `peer` to be opened or kept with `strength`.
    fn suggest(&mut self, peer: &Identifier, strength: u32);

    /// Withdraw an earlier suggestion.
    fn cancel(&mut self, peer: &Identifier);

    /// Pass on a HELLO learned from the DHT.
    fn offer_hello(&mut self, hello: &Hello);
}

/// A [`Connectivity`] that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoConnectivity;

impl Connectivity for NoConnectivity {
    fn suggest(&mut self, _peer: &Identifier, _strength: u32) {}

    fn cancel(&mut self, _peer: &Identifier) {}

    fn offer_hello(&mut self, _hello: &Hello) {}
}

/// An identity the node wants to be better connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesiredPeer {
    pub strength: u32,
}

/// Tracks desired peers and their suggestion strengths.
#[derive(Debug, Default)]
pub struct ConnectivityAdvisor {
    desired: HashMap<Identifier, DesiredPeer>,
}

impl ConnectivityAdvisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strength of the wish to be connected to `peer` given the table's
    /// current occupancy.
    ///
    /// Under-filled buckets scale with the missing peers times the bucket
    /// index, full buckets keep a floor of the bucket index, and over-full
    /// buckets yield zero. Connected peers count double. Bucket `0` is treated
    /// as index `1` so a desired peer there is never dropped for being too
    /// close.
    pub fn strength<L>(table: &RoutingTable<L>, peer: &Identifier) -> u32 {
        let Some(bucket) = bucket_index(table.local(), peer) else {
            return 0;
        };
        let capacity = table.bucket_size();
        let occupancy = table.bucket_len(bucket);
        let weight = u32::try_from(bucket.max(1)).unwrap_or(u32::MAX);

        if occupancy > capacity {
            return 0;
        }
        let base = if occupancy < capacity {
            u32::try_from(capacity - occupancy)
                .unwrap_or(u32::MAX)
                .saturating_mul(weight)
        } else {
            weight
        };

        if table.contains(peer) {
            base.saturating_mul(2)
        } else {
            base
        }
    }

    /// Start tracking `peer` and evaluate it right away.
    pub fn desire<L>(
        &mut self,
        table: &RoutingTable<L>,
        peer: Identifier,
        connectivity: &mut dyn Connectivity,
    ) {
        if peer == *table.local() {
            return;
        }
        self.desired
            .entry(peer)
            .or_insert(DesiredPeer { strength: 0 });
        self.evaluate(table, &peer, connectivity);
    }

    /// Recompute every desired peer after a change in bucket occupancy.
    pub fn reevaluate<L>(&mut self, table: &RoutingTable<L>, connectivity: &mut dyn Connectivity) {
        let peers: Vec<_> = self.desired.keys().copied().collect();
        for peer in peers {
            self.evaluate(table, &peer, connectivity);
        }
    }

    fn evaluate<L>(
        &mut self,
        table: &RoutingTable<L>,
        peer: &Identifier,
        connectivity: &mut dyn Connectivity,
    ) {
        let strength = Self::strength(table, peer);
        let Some(desired) = self.desired.get_mut(peer) else {
            return;
        };

        if strength == 0 {
            let had_suggestion = desired.strength != 0;
            self.desired.remove(peer);
            if had_suggestion {
                connectivity.cancel(peer);
                table.metrics().suggestions_cancelled_total.increment(1);
            }
            debug!(%peer, "no longer desired");
            return;
        }

        if desired.strength != strength {
            trace!(%peer, old = desired.strength, new = strength, "connection strength changed");
            desired.strength = strength;
            connectivity.suggest(peer, strength);
            table.metrics().suggestions_total.increment(1);
        }
    }

    /// Current strength for `peer`, if it is desired.
    pub fn get(&self, peer: &Identifier) -> Option<u32> {
        self.desired.get(peer).map(|d| d.strength)
    }

    pub fn len(&self) -> usize {
        self.desired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.desired.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use vertex_dht_primitives::BUCKET_COUNT;

    use super::*;
    use crate::RoutingConfig;

    #[derive(Debug, Default)]
    struct Recorder {
        suggested: Vec<(Identifier, u32)>,
        cancelled: Vec<Identifier>,
    }

    impl Connectivity for Recorder {
        fn suggest(&mut self, peer: &Identifier, strength: u32) {
            self.suggested.push((*peer, strength));
        }

        fn cancel(&mut self, peer: &Identifier) {
            self.cancelled.push(*peer);
        }

        fn offer_hello(&mut self, _hello: &Hello) {}
    }

    fn peer_in_bucket(bucket: usize, tag: u8) -> Identifier {
        let mut bytes = [0u8; 64];
        bytes[63] = tag;
        Identifier::new(bytes).with_flipped_bit(BUCKET_COUNT - bucket - 1)
    }

    fn table(k: usize) -> RoutingTable<()> {
        RoutingTable::new(Identifier::ZERO, RoutingConfig::default().with_bucket_size(k))
    }

    #[test]
    fn test_strength_follows_occupancy() {
        let mut t = table(4);
        let candidate = peer_in_bucket(20, 0xf0);

        // empty bucket: (4 - 0) * 20
        assert_eq!(ConnectivityAdvisor::strength(&t, &candidate), 80);

        for tag in 0..3 {
            t.on_connect(peer_in_bucket(20, tag), ()).unwrap();
        }
        assert_eq!(ConnectivityAdvisor::strength(&t, &candidate), 20);

        t.on_connect(peer_in_bucket(20, 3), ()).unwrap();
        assert_eq!(ConnectivityAdvisor::strength(&t, &candidate), 20);

        // connected peers count double
        assert_eq!(ConnectivityAdvisor::strength(&t, &peer_in_bucket(20, 3)), 40);

        t.on_connect(peer_in_bucket(20, 4), ()).unwrap();
        assert_eq!(ConnectivityAdvisor::strength(&t, &candidate), 0);
    }

    #[test]
    fn test_bucket_zero_has_floor() {
        let t = table(2);
        let neighbour = Identifier::ZERO.with_flipped_bit(BUCKET_COUNT - 1);
        assert_eq!(ConnectivityAdvisor::strength(&t, &neighbour), 2);
        assert_eq!(ConnectivityAdvisor::strength(&t, &Identifier::ZERO), 0);
    }

    #[test]
    fn test_suggest_then_cancel_on_overfill() {
        let mut t = table(1);
        let mut advisor = ConnectivityAdvisor::new();
        let mut rec = Recorder::default();
        let candidate = peer_in_bucket(30, 0xf0);

        advisor.desire(&t, candidate, &mut rec);
        assert_eq!(rec.suggested, vec![(candidate, 30)]);
        assert_eq!(advisor.get(&candidate), Some(30));

        // unchanged strength is not re-issued
        advisor.reevaluate(&t, &mut rec);
        assert_eq!(rec.suggested.len(), 1);

        t.on_connect(peer_in_bucket(30, 1), ()).unwrap();
        t.on_connect(peer_in_bucket(30, 2), ()).unwrap();
        advisor.reevaluate(&t, &mut rec);
        assert_eq!(rec.cancelled, vec![candidate]);
        assert!(advisor.is_empty());
    }

    #[test]
    fn test_local_identity_is_never_desired() {
        let t = table(4);
        let mut advisor = ConnectivityAdvisor::new();
        advisor.desire(&t, Identifier::ZERO, &mut NoConnectivity);
        assert!(advisor.is_empty());
    }
}
