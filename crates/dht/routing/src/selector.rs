//! Choice of forwarding targets.
//!
//! While a request is younger (in hops) than the network size estimate, it is
//! spread over uniformly random peers. After that it is routed greedily towards
//! the key.

use rand::Rng;
use tracing::trace;
use vertex_dht_primitives::{Identifier, PeerFilter, scalar_distance};

use crate::{PeerHandle, ReplicationEstimator, RoutingTable};

/// Picks forwarding targets from a routing table.
#[derive(Debug)]
pub struct PeerSelector<'a, L> {
    table: &'a RoutingTable<L>,
    estimator: ReplicationEstimator,
    network_size: f64,
}

impl<'a, L: Clone> PeerSelector<'a, L> {
    pub fn new(table: &'a RoutingTable<L>, network_size: f64) -> Self {
        Self {
            table,
            estimator: ReplicationEstimator::new(table.config().max_replication),
            network_size,
        }
    }

    /// Choose up to `forward_count` peers for a request on `key`.
    ///
    /// Every returned peer has been inserted into `filter`. Fewer peers than
    /// requested are returned when not enough are eligible.
    pub fn select_targets<R: Rng + ?Sized>(
        &self,
        key: &Identifier,
        filter: &mut PeerFilter,
        hop_count: u32,
        desired_replication: u32,
        rng: &mut R,
    ) -> Vec<PeerHandle<L>> {
        let wanted = self.estimator.forward_count(
            hop_count,
            desired_replication,
            self.network_size,
            rng,
        );
        if wanted == 0 {
            return Vec::new();
        }

        let targets = if f64::from(hop_count) >= self.network_size {
            self.greedy(key, filter, wanted)
        } else {
            self.random(filter, wanted, rng)
        };

        if targets.is_empty() {
            self.table.metrics().selection_failed_total.increment(1);
        }
        for target in &targets {
            filter.insert(target.id());
        }
        trace!(%key, hop_count, wanted, selected = targets.len(), peers = self.table.peer_count(), "selected targets");
        targets
    }

    /// Peers examined for routing, bucket by bucket.
    fn candidates(&self) -> impl Iterator<Item = &'a PeerHandle<L>> + 'a {
        let table = self.table;
        (0..=table.closest_bucket()).flat_map(move |bucket| table.routing_window(bucket))
    }

    /// The `wanted` closest slots by scalar distance. Excluded peers take part
    /// in the ranking, so a slot won by an excluded peer stays empty rather
    /// than going to the next farther one.
    fn greedy(&self, key: &Identifier, filter: &PeerFilter, wanted: usize) -> Vec<PeerHandle<L>> {
        let mut ranked: Vec<_> = self
            .candidates()
            .map(|peer| (scalar_distance(key, peer.id()), peer))
            .collect();
        ranked.sort_by(|(da, a), (db, b)| da.cmp(db).then_with(|| a.id().cmp(b.id())));

        ranked
            .into_iter()
            .take(wanted)
            .filter(|(_, peer)| {
                let excluded = filter.contains(peer.id());
                if excluded {
                    self.table.metrics().bloom_excluded_total.increment(1);
                }
                !excluded
            })
            .map(|(_, peer)| peer.clone())
            .collect()
    }

    /// Uniform sample of `wanted` distinct eligible peers, in one pass.
    fn random<R: Rng + ?Sized>(
        &self,
        filter: &PeerFilter,
        wanted: usize,
        rng: &mut R,
    ) -> Vec<PeerHandle<L>> {
        let mut reservoir: Vec<&PeerHandle<L>> = Vec::with_capacity(wanted);
        let mut seen = 0usize;

        for peer in self.candidates() {
            if filter.contains(peer.id()) {
                self.table.metrics().bloom_excluded_total.increment(1);
                continue;
            }
            if reservoir.len() < wanted {
                reservoir.push(peer);
            } else {
                let slot = rng.random_range(0..=seen);
                if let Some(entry) = reservoir.get_mut(slot) {
                    *entry = peer;
                }
            }
            seen += 1;
        }

        reservoir.into_iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;
    use rand::{SeedableRng, rngs::StdRng};
    use vertex_dht_primitives::BUCKET_COUNT;

    use super::*;
    use crate::RoutingConfig;

    /// An identity in `bucket` of `local`. The bits after the first mismatch
    /// come from a digest of `bucket` and `tag`, so filter positions stay well
    /// spread.
    fn peer_in_bucket(local: &Identifier, bucket: usize, tag: u8) -> Identifier {
        let split = BUCKET_COUNT - bucket - 1;
        let tail = Identifier::digest(format!("{bucket}/{tag}"));
        (split + 1..BUCKET_COUNT)
            .filter(|&bit| local.bit(bit) != tail.bit(bit))
            .fold(*local, |id, bit| id.with_flipped_bit(bit))
            .with_flipped_bit(split)
    }

    fn populated(per_bucket: usize, buckets: &[usize]) -> RoutingTable<u8> {
        let local = Identifier::ZERO;
        let mut table = RoutingTable::new(local, RoutingConfig::default());
        for &bucket in buckets {
            for tag in 0..per_bucket as u8 {
                table
                    .on_connect(peer_in_bucket(&local, bucket, tag), tag)
                    .unwrap();
            }
        }
        table
    }

    #[test]
    fn test_greedy_picks_closest() {
        let table = populated(2, &[100, 200, 300]);
        let key = peer_in_bucket(&Identifier::ZERO, 100, 0x55);
        let selector = PeerSelector::new(&table, 1.0);
        let mut filter = PeerFilter::new();

        // greedy phase with a fan-out of 1 + 15 / 16
        let mut rng = StdRng::seed_from_u64(1);
        let targets = selector.select_targets(&key, &mut filter, 1, 16, &mut rng);
        assert!(!targets.is_empty());
        for t in &targets {
            assert_eq!(table.bucket_for(t.id()), Some(100));
            assert!(filter.contains(t.id()));
        }
    }

    #[test]
    fn test_greedy_excluded_closer_peer_suppresses_slot() {
        let local = Identifier::ZERO;
        let mut table = RoutingTable::new(local, RoutingConfig::default());
        let near = peer_in_bucket(&local, 300, 1);
        let far = peer_in_bucket(&local, 10, 2);
        table.on_connect(near, 0u8).unwrap();
        table.on_connect(far, 1u8).unwrap();

        let key = peer_in_bucket(&local, 300, 3);
        let selector = PeerSelector::new(&table, 1.0);

        // hop 3 > 2 * nse: unicast to the closest peer
        let mut open = PeerFilter::new();
        let targets = selector.select_targets(&key, &mut open, 3, 4, &mut StdRng::seed_from_u64(0));
        assert_eq!(targets.iter().map(|t| *t.id()).collect::<Vec<_>>(), vec![near]);

        let mut filter = PeerFilter::new();
        filter.insert(&near);
        assert!(!filter.contains(&far));

        // the one slot belongs to the excluded peer, so `far` is not used instead
        let targets = selector.select_targets(&key, &mut filter, 3, 4, &mut StdRng::seed_from_u64(0));
        assert!(targets.is_empty());
        assert!(!filter.contains(&far));
    }

    #[test]
    fn test_random_phase_returns_distinct_eligible() {
        let table = populated(3, &[50, 60, 70, 80]);
        let selector = PeerSelector::new(&table, 20.0);
        let mut filter = PeerFilter::new();
        let excluded = peer_in_bucket(&Identifier::ZERO, 50, 0);
        filter.insert(&excluded);

        let mut rng = StdRng::seed_from_u64(7);
        let targets = selector.select_targets(&Identifier::digest(b"k"), &mut filter, 0, 16, &mut rng);
        let ids: HashSet<_> = targets.iter().map(|t| *t.id()).collect();
        assert_eq!(ids.len(), targets.len());
        assert!(!ids.contains(&excluded));
        assert!((1..=2).contains(&targets.len()));
    }

    #[test]
    fn test_returns_what_is_available() {
        let table = populated(1, &[42]);
        let selector = PeerSelector::new(&table, 20.0);
        let mut filter = PeerFilter::new();
        let targets = selector.select_targets(&Identifier::digest(b"k"), &mut filter, 0, 16, &mut StdRng::seed_from_u64(3));
        assert_eq!(targets.len(), 1);
    }

    #[test]
    fn test_only_routing_window_is_considered() {
        let local = Identifier::ZERO;
        let mut table = RoutingTable::new(local, RoutingConfig::default().with_bucket_size(1));
        let first = peer_in_bucket(&local, 90, 0);
        let second = peer_in_bucket(&local, 90, 1);
        table.on_connect(first, 0u8).unwrap();
        table.on_connect(second, 1u8).unwrap();

        let selector = PeerSelector::new(&table, 20.0);
        let mut filter = PeerFilter::new();
        filter.insert(&first);
        let targets = selector.select_targets(&Identifier::digest(b"k"), &mut filter, 0, 16, &mut StdRng::seed_from_u64(3));
        assert!(targets.is_empty());
    }

    proptest! {
        #[test]
        fn repeated_selection_never_repeats(seed in any::<u64>(), hop in 0u32..8, nse in 1.0f64..10.0) {
            let table = populated(4, &[10, 20, 30, 40, 50]);
            let selector = PeerSelector::new(&table, nse);
            let key = Identifier::digest(seed.to_be_bytes());
            let mut filter = PeerFilter::new();
            let mut rng = StdRng::seed_from_u64(seed);

            let first = selector.select_targets(&key, &mut filter, hop, 16, &mut rng);
            let second = selector.select_targets(&key, &mut filter, hop, 16, &mut rng);

            let mut seen = HashSet::new();
            for t in first.iter().chain(&second) {
                prop_assert!(seen.insert(*t.id()));
            }
        }
    }
}
