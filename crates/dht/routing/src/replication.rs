//! Fan-out estimate for forwarded requests.

use rand::Rng;

use crate::DEFAULT_MAX_REPLICATION;

/// Turns a request's hop count and desired replication into the number of
/// peers the next hop should forward it to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationEstimator {
    max_replication: u32,
}

impl Default for ReplicationEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REPLICATION)
    }
}

impl ReplicationEstimator {
    pub fn new(max_replication: u32) -> Self {
        Self {
            max_replication: max_replication.max(1),
        }
    }

    pub const fn max_replication(&self) -> u32 {
        self.max_replication
    }

    /// Number of peers to forward to.
    ///
    /// Zero once `hop_count` exceeds four times the network size estimate, one
    /// once it exceeds twice the estimate. Below that the expected result is
    /// `1 + (r - 1) / (nse + (r - 1) * hop_count)`, with the fractional part
    /// realised by a random round-up.
    pub fn forward_count<R: Rng + ?Sized>(
        &self,
        hop_count: u32,
        desired_replication: u32,
        network_size: f64,
        rng: &mut R,
    ) -> usize {
        let hops = f64::from(hop_count);
        if hops > 4.0 * network_size {
            return 0;
        }
        if hops > 2.0 * network_size {
            return 1;
        }

        let extra = f64::from(desired_replication.clamp(1, self.max_replication) - 1);
        let denominator = network_size + extra * hops;
        let target = if denominator > 0.0 {
            1.0 + extra / denominator
        } else {
            1.0 + extra
        };

        let base = target.floor();
        let fraction = target - base;
        let round_up = f64::from(rng.random::<u32>()) < fraction * f64::from(u32::MAX);
        base as usize + usize::from(round_up)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::RngCore;

    use super::*;

    /// Returns the same word forever.
    struct ConstRng(u32);

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

    #[test]
    fn test_ttl_exceeded() {
        let est = ReplicationEstimator::default();
        assert_eq!(est.forward_count(20, 4, 4.0, &mut ConstRng(0)), 0);
        assert_eq!(est.forward_count(17, 16, 4.0, &mut ConstRng(0)), 0);
    }

    #[test]
    fn test_unicast_band() {
        let est = ReplicationEstimator::default();
        assert_eq!(est.forward_count(9, 16, 4.0, &mut ConstRng(0)), 1);
        assert_eq!(est.forward_count(16, 16, 4.0, &mut ConstRng(u32::MAX)), 1);
    }

    #[test]
    fn test_first_hop_fanout() {
        let est = ReplicationEstimator::default();
        // 1 + 3 / 4 = 1.75
        assert_eq!(est.forward_count(0, 4, 4.0, &mut ConstRng(0)), 2);
        assert_eq!(est.forward_count(0, 4, 4.0, &mut ConstRng(u32::MAX)), 1);
        // 1 + 15 / 1 = 16
        assert_eq!(est.forward_count(0, 16, 1.0, &mut ConstRng(u32::MAX)), 16);
    }

    #[test]
    fn test_replication_is_clamped() {
        let est = ReplicationEstimator::default();
        assert_eq!(
            est.forward_count(0, 1000, 1.0, &mut ConstRng(0)),
            est.forward_count(0, 16, 1.0, &mut ConstRng(0))
        );
        assert_eq!(est.forward_count(0, 0, 1.0, &mut ConstRng(0)), 1);
    }

    #[test]
    fn test_zero_network_size() {
        let est = ReplicationEstimator::default();
        assert_eq!(est.forward_count(0, 5, 0.0, &mut ConstRng(u32::MAX)), 5);
        assert_eq!(est.forward_count(1, 5, 0.0, &mut ConstRng(0)), 0);
    }

    proptest! {
        #[test]
        fn forward_count_decays_with_hops(
            replication in 1u32..=16,
            network_size in 0.5f64..20.0,
            hop in 0u32..100,
            word in any::<u32>(),
        ) {
            let est = ReplicationEstimator::default();
            let now = est.forward_count(hop, replication, network_size, &mut ConstRng(word));
            let later = est.forward_count(hop + 1, replication, network_size, &mut ConstRng(word));
            prop_assert!(later <= now);
            if f64::from(hop) > 4.0 * network_size {
                prop_assert_eq!(now, 0);
            }
        }
    }
}
