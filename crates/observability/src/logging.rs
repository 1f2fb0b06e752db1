//! Tracing subscriber setup.

use eyre::Result;
use tracing_subscriber::EnvFilter;

use crate::LogArgs;

/// Build the filter for `args`, with `env` standing in for `RUST_LOG`.
///
/// Precedence:
/// 1. `--quiet` shows errors only
/// 2. otherwise `env` if set and valid, else a level chosen by `-v` count
/// 3. directives from `--log.filter` are added on top
pub fn build_filter(args: &LogArgs, env: Option<&str>) -> EnvFilter {
    if args.quiet {
        return EnvFilter::new("error");
    }

    let base_level = match args.verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let mut filter = env
        .and_then(|env| EnvFilter::try_new(env).ok())
        .unwrap_or_else(|| EnvFilter::new(base_level));

    if let Some(custom_filter) = &args.filter {
        for directive in custom_filter.split(',') {
            if let Ok(d) = directive.parse() {
                filter = filter.add_directive(d);
            }
        }
    }
    filter
}

/// Install the global tracing subscriber.
pub fn init_logging(args: &LogArgs) -> Result<()> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let builder = tracing_subscriber::fmt().with_env_filter(build_filter(args, env.as_deref()));

    let installed = if args.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|err| eyre::eyre!("failed to install tracing subscriber: {err}"))
}
