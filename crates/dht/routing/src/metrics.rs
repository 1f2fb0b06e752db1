//! Routing table metrics

use metrics::Counter;

/// Routing table metrics
#[derive(Clone, Debug)]
pub(crate) struct RoutingMetrics {
    /// Peers added to the table
    pub(crate) peers_connected_total: Counter,
    /// Peers removed from the table
    pub(crate) peers_disconnected_total: Counter,
    /// Candidate targets skipped because the request's filter contained them
    pub(crate) bloom_excluded_total: Counter,
    /// Selections that found no eligible target
    pub(crate) selection_failed_total: Counter,
    /// Connectivity suggestions issued to the networking layer
    pub(crate) suggestions_total: Counter,
    /// Connectivity suggestions withdrawn
    pub(crate) suggestions_cancelled_total: Counter,
}

impl Default for RoutingMetrics {
    fn default() -> Self {
        Self {
            peers_connected_total: metrics::counter!("dht.routing.peers_connected_total"),
            peers_disconnected_total: metrics::counter!("dht.routing.peers_disconnected_total"),
            bloom_excluded_total: metrics::counter!("dht.routing.bloom_excluded_total"),
            selection_failed_total: metrics::counter!("dht.routing.selection_failed_total"),
            suggestions_total: metrics::counter!("dht.routing.suggestions_total"),
            suggestions_cancelled_total: metrics::counter!(
                "dht.routing.suggestions_cancelled_total"
            ),
        }
    }
}
