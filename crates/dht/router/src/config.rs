//! Router configuration.

use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};

/// Shortest delay between two FIND-PEER rounds.
pub const DEFAULT_FIND_PEER_MIN_INTERVAL: Duration = Duration::from_secs(30);

/// Longest delay between two FIND-PEER rounds.
pub const DEFAULT_FIND_PEER_MAX_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Delay used instead of a round when plenty of new peers showed up recently.
pub const DEFAULT_FIND_PEER_BUSY_BACKOFF: Duration = Duration::from_secs(60);

/// Replication level of outgoing FIND-PEER requests.
pub const DEFAULT_FIND_PEER_REPLICATION: u32 = 4;

/// Number of reverse-path entries kept for in-flight GETs.
pub const DEFAULT_PENDING_CAPACITY: usize = 1000;

/// Age after which a reverse-path entry no longer routes replies.
pub const DEFAULT_GET_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Lifetime of HELLO blocks handed out in FIND-PEER answers.
pub const DEFAULT_HELLO_EXPIRATION: Duration = Duration::from_secs(12 * 60 * 60);

/// Buffered route events per monitor subscriber.
pub const DEFAULT_MONITOR_CAPACITY: usize = 256;

/// Configuration for the message router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    pub find_peer_min_interval: Duration,
    pub find_peer_max_interval: Duration,
    pub find_peer_busy_backoff: Duration,
    pub find_peer_replication: u32,

    /// Reverse-path entries kept at most; the oldest is evicted first.
    pub pending_capacity: usize,
    pub get_timeout: Duration,

    pub hello_expiration: Duration,

    /// Store every RESULT passing through in the local content store.
    pub cache_results: bool,

    pub monitor_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            find_peer_min_interval: DEFAULT_FIND_PEER_MIN_INTERVAL,
            find_peer_max_interval: DEFAULT_FIND_PEER_MAX_INTERVAL,
            find_peer_busy_backoff: DEFAULT_FIND_PEER_BUSY_BACKOFF,
            find_peer_replication: DEFAULT_FIND_PEER_REPLICATION,
            pending_capacity: DEFAULT_PENDING_CAPACITY,
            get_timeout: DEFAULT_GET_TIMEOUT,
            hello_expiration: DEFAULT_HELLO_EXPIRATION,
            cache_results: false,
            monitor_capacity: DEFAULT_MONITOR_CAPACITY,
        }
    }
}

impl RouterConfig {
    /// Set the bounds of the FIND-PEER interval. `max` is raised to `min` if
    /// lower.
    pub fn with_find_peer_interval(mut self, min: Duration, max: Duration) -> Self {
        self.find_peer_min_interval = min;
        self.find_peer_max_interval = max.max(min);
        self
    }

    pub fn with_find_peer_busy_backoff(mut self, backoff: Duration) -> Self {
        self.find_peer_busy_backoff = backoff;
        self
    }

    pub fn with_find_peer_replication(mut self, replication: u32) -> Self {
        self.find_peer_replication = replication.max(1);
        self
    }

    pub fn with_pending_capacity(mut self, capacity: usize) -> Self {
        self.pending_capacity = capacity.max(1);
        self
    }

    pub fn with_get_timeout(mut self, timeout: Duration) -> Self {
        self.get_timeout = timeout;
        self
    }

    pub fn with_hello_expiration(mut self, expiration: Duration) -> Self {
        self.hello_expiration = expiration;
        self
    }

    pub fn with_cache_results(mut self, cache: bool) -> Self {
        self.cache_results = cache;
        self
    }

    pub fn with_monitor_capacity(mut self, capacity: usize) -> Self {
        self.monitor_capacity = capacity.max(1);
        self
    }
}

/// Router CLI arguments.
#[derive(Debug, Args, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[command(next_help_heading = "Router")]
#[serde(default)]
pub struct RouterArgs {
    /// Shortest delay between FIND-PEER rounds, in seconds.
    #[arg(
        long = "router.find-peer-min-secs",
        value_name = "SECS",
        default_value_t = DEFAULT_FIND_PEER_MIN_INTERVAL.as_secs()
    )]
    pub find_peer_min_secs: u64,

    /// Longest delay between FIND-PEER rounds, in seconds.
    #[arg(
        long = "router.find-peer-max-secs",
        value_name = "SECS",
        default_value_t = DEFAULT_FIND_PEER_MAX_INTERVAL.as_secs()
    )]
    pub find_peer_max_secs: u64,

    /// Replication level of FIND-PEER requests.
    #[arg(
        long = "router.find-peer-replication",
        value_name = "COUNT",
        default_value_t = DEFAULT_FIND_PEER_REPLICATION
    )]
    pub find_peer_replication: u32,

    /// Reverse-path entries kept for in-flight GETs.
    #[arg(
        long = "router.pending-capacity",
        value_name = "COUNT",
        default_value_t = DEFAULT_PENDING_CAPACITY
    )]
    pub pending_capacity: usize,

    /// Cache RESULT blocks that pass through this node.
    #[arg(long = "router.cache-results", default_value_t = false)]
    pub cache_results: bool,
}

impl Default for RouterArgs {
    fn default() -> Self {
        Self {
            find_peer_min_secs: DEFAULT_FIND_PEER_MIN_INTERVAL.as_secs(),
            find_peer_max_secs: DEFAULT_FIND_PEER_MAX_INTERVAL.as_secs(),
            find_peer_replication: DEFAULT_FIND_PEER_REPLICATION,
            pending_capacity: DEFAULT_PENDING_CAPACITY,
            cache_results: false,
        }
    }
}

impl From<&RouterArgs> for RouterConfig {
    fn from(args: &RouterArgs) -> Self {
        Self::default()
            .with_find_peer_interval(
                Duration::from_secs(args.find_peer_min_secs),
                Duration::from_secs(args.find_peer_max_secs),
            )
            .with_find_peer_replication(args.find_peer_replication)
            .with_pending_capacity(args.pending_capacity)
            .with_cache_results(args.cache_results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults_match_config() {
        assert_eq!(RouterConfig::from(&RouterArgs::default()), RouterConfig::default());
    }

    #[test]
    fn test_interval_bounds_are_ordered() {
        let config = RouterConfig::default()
            .with_find_peer_interval(Duration::from_secs(60), Duration::from_secs(10));
        assert_eq!(config.find_peer_max_interval, Duration::from_secs(60));
    }
}
