//! Logging for Vertex DHT binaries.

mod args;
mod logging;

pub use args::LogArgs;
pub use logging::{build_filter, init_logging};
