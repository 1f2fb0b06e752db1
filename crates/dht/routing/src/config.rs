//! Routing table configuration.

use clap::Args;
use serde::{Deserialize, Serialize};

/// Default number of peers examined per bucket (`K`).
pub const DEFAULT_BUCKET_SIZE: usize = 8;

/// Default cap on the replication level a request may ask for.
pub const DEFAULT_MAX_REPLICATION: u32 = 16;

/// Configuration for the routing table and peer selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    /// Peers per bucket that take part in routing decisions. A bucket may
    /// temporarily hold more; those beyond the first `bucket_size` are ignored
    /// until earlier entries disconnect.
    pub bucket_size: usize,

    /// Requested replication levels are clamped to this value.
    pub max_replication: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            bucket_size: DEFAULT_BUCKET_SIZE,
            max_replication: DEFAULT_MAX_REPLICATION,
        }
    }
}

impl RoutingConfig {
    /// Set the per-bucket routing window.
    pub fn with_bucket_size(mut self, size: usize) -> Self {
        self.bucket_size = size.max(1);
        self
    }

    /// Set the replication cap.
    pub fn with_max_replication(mut self, max: u32) -> Self {
        self.max_replication = max.max(1);
        self
    }
}

/// Routing CLI arguments.
#[derive(Debug, Args, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[command(next_help_heading = "Routing")]
#[serde(default)]
pub struct RoutingArgs {
    /// Peers per bucket that take part in routing decisions.
    #[arg(long = "routing.bucket-size", value_name = "K", default_value_t = DEFAULT_BUCKET_SIZE)]
    pub bucket_size: usize,

    /// Upper bound on the replication level of forwarded requests.
    #[arg(
        long = "routing.max-replication",
        value_name = "COUNT",
        default_value_t = DEFAULT_MAX_REPLICATION
    )]
    pub max_replication: u32,
}

impl Default for RoutingArgs {
    fn default() -> Self {
        Self {
            bucket_size: DEFAULT_BUCKET_SIZE,
            max_replication: DEFAULT_MAX_REPLICATION,
        }
    }
}

impl From<&RoutingArgs> for RoutingConfig {
    fn from(args: &RoutingArgs) -> Self {
        Self::default()
            .with_bucket_size(args.bucket_size)
            .with_max_replication(args.max_replication)
    }
}
