//! Router counters.
//!
//! Every counter is exported through the `metrics` facade and mirrored in a
//! plain [`RouterStats`] snapshot for callers without a recorder installed.

use metrics::Counter;

macro_rules! router_counters {
    ($($(#[$doc:meta])* $field:ident => $name:literal,)*) => {
        /// Snapshot of the router's counters since start.
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct RouterStats {
            $($(#[$doc])* pub $field: u64,)*
        }

        #[derive(Clone, Debug)]
        struct RouterMetrics {
            $($field: Counter,)*
        }

        impl Default for RouterMetrics {
            fn default() -> Self {
                Self {
                    $($field: metrics::counter!($name),)*
                }
            }
        }

        /// Router counters, both exported and kept locally.
        #[derive(Debug, Default)]
        pub(crate) struct Counters {
            stats: RouterStats,
            metrics: RouterMetrics,
        }

        impl Counters {
            $(
                pub(crate) fn $field(&mut self, n: u64) {
                    self.stats.$field += n;
                    self.metrics.$field.increment(n);
                }
            )*

            pub(crate) const fn snapshot(&self) -> RouterStats {
                self.stats
            }
        }
    };
}

router_counters! {
    /// PUTs received from neighbours or local clients
    puts_received => "dht.router.puts_received_total",
    /// PUTs dropped because they had expired
    puts_expired => "dht.router.puts_expired_total",
    /// PUTs stored locally
    puts_stored => "dht.router.puts_stored_total",
    /// PUT copies queued to neighbours
    puts_forwarded => "dht.router.puts_forwarded_total",
    /// GETs received from neighbours or local clients
    gets_received => "dht.router.gets_received_total",
    /// GETs for a block type the evaluator does not support
    gets_unsupported => "dht.router.gets_unsupported_total",
    /// GET copies queued to neighbours
    gets_forwarded => "dht.router.gets_forwarded_total",
    /// RESULTs received from neighbours
    results_received => "dht.router.results_received_total",
    /// RESULTs dropped because they had expired
    results_expired => "dht.router.results_expired_total",
    /// RESULTs queued towards requesters
    results_forwarded => "dht.router.results_forwarded_total",
    /// Replies handed to local clients for local requests
    results_delivered_locally => "dht.router.results_delivered_locally_total",
    /// Replies a requester had already received
    duplicate_replies => "dht.router.duplicate_replies_total",
    /// Replies no pending request was waiting for
    unroutable_replies => "dht.router.unroutable_replies_total",
    /// Messages dropped because the target's queue was full
    queue_full_drops => "dht.router.queue_full_drops_total",
    /// Messages dropped because the target is no longer connected
    disconnected_drops => "dht.router.disconnected_drops_total",
    /// Messages dropped because they could not be made to fit a frame
    oversized_drops => "dht.router.oversized_drops_total",
    /// Messages rejected as protocol violations
    protocol_violations => "dht.router.protocol_violations_total",
    /// Reverse-path entries evicted to make room
    pending_evicted => "dht.router.pending_evicted_total",
    /// Reverse-path entries dropped because they timed out
    pending_expired => "dht.router.pending_expired_total",
    /// FIND-PEER requests sent
    find_peer_rounds => "dht.router.find_peer_rounds_total",
    /// FIND-PEER rounds skipped because enough new peers showed up
    find_peer_skipped => "dht.router.find_peer_skipped_total",
    /// HELLOs sent in answer to FIND-PEER requests
    hellos_sent => "dht.router.hellos_sent_total",
    /// HELLOs learned from FIND-PEER answers
    hellos_learned => "dht.router.hellos_learned_total",
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_tracks_increments() {
        let mut counters = Counters::default();
        counters.queue_full_drops(1);
        counters.queue_full_drops(2);
        counters.puts_received(1);

        let stats = counters.snapshot();
        assert_eq!(stats.queue_full_drops, 3);
        assert_eq!(stats.puts_received, 1);
        assert_eq!(stats.gets_received, 0);
    }
}
