//! Command line entry point.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use vertex_dht_observability::{LogArgs, init_logging};
use vertex_dht_primitives::{Identifier, bucket_index, matching_bits, scalar_distance};
use vertex_dht_router::RouterArgs;
use vertex_dht_routing::RoutingArgs;

use crate::simulate::{Simulation, SimulationParams};

/// Vertex DHT - routing core tools
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct DhtCli {
    /// Logging configuration (applies to all subcommands).
    #[command(flatten)]
    pub(crate) logs: LogArgs,

    #[command(subcommand)]
    pub(crate) command: DhtCommands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum DhtCommands {
    /// Route PUTs and GETs through a network of in-process nodes.
    Simulate(SimulateArgs),
    /// Show how two identifiers relate in the routing table.
    Distance(DistanceArgs),
}

#[derive(Debug, Args)]
pub(crate) struct SimulateArgs {
    /// Number of nodes.
    #[arg(long, default_value_t = 64)]
    pub(crate) nodes: usize,

    /// Neighbours each node dials.
    #[arg(long, default_value_t = 6)]
    pub(crate) degree: usize,

    /// Blocks to store and then look up.
    #[arg(long, default_value_t = 32)]
    pub(crate) blocks: usize,

    /// Replication level of each PUT and GET.
    #[arg(long, default_value_t = 4)]
    pub(crate) replication: u32,

    /// Messages each outbound queue holds before dropping.
    #[arg(long, default_value_t = 64)]
    pub(crate) queue_capacity: usize,

    /// Seed for identities, topology and routing decisions.
    #[arg(long, default_value_t = 1)]
    pub(crate) seed: u64,

    /// TOML file with `[routing]` and `[router]` tables. Replaces the
    /// routing and router flags when given.
    #[arg(long, value_name = "FILE")]
    pub(crate) config: Option<PathBuf>,

    #[command(flatten)]
    pub(crate) node: NodeArgs,
}

/// Per-node configuration, from flags or a TOML file.
#[derive(Debug, Clone, Default, Args, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub(crate) struct NodeArgs {
    #[command(flatten)]
    pub(crate) routing: RoutingArgs,

    #[command(flatten)]
    pub(crate) router: RouterArgs,
}

impl NodeArgs {
    fn load(path: &PathBuf) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&raw).wrap_err_with(|| format!("failed to parse {}", path.display()))
    }
}

#[derive(Debug, Args)]
pub(crate) struct DistanceArgs {
    /// Local identifier, 128 hex characters.
    pub(crate) local: Identifier,

    /// Other identifier, 128 hex characters.
    pub(crate) other: Identifier,
}

pub(crate) async fn run() -> Result<()> {
    let cli = DhtCli::parse();
    init_logging(&cli.logs)?;

    match cli.command {
        DhtCommands::Simulate(args) => simulate(args),
        DhtCommands::Distance(args) => {
            distance(&args);
            Ok(())
        }
    }
}

fn simulate(args: SimulateArgs) -> Result<()> {
    let node = match &args.config {
        Some(path) => NodeArgs::load(path)?,
        None => args.node.clone(),
    };
    if args.nodes < 2 {
        eyre::bail!("a simulation needs at least two nodes");
    }

    let params = SimulationParams {
        nodes: args.nodes,
        degree: args.degree.clamp(1, args.nodes - 1),
        blocks: args.blocks,
        replication: args.replication,
        queue_capacity: args.queue_capacity.max(1),
        seed: args.seed,
    };
    let mut simulation = Simulation::new(&params, (&node.routing).into(), (&node.router).into())?;
    let report = simulation.run(&params)?;
    print!("{}", toml::to_string_pretty(&report)?);
    Ok(())
}

fn distance(args: &DistanceArgs) {
    println!("matching_bits = {}", matching_bits(&args.local, &args.other));
    match bucket_index(&args.local, &args.other) {
        Some(bucket) => println!("bucket = {bucket}"),
        None => println!("bucket = none (identical)"),
    }
    println!("scalar_distance = {}", scalar_distance(&args.other, &args.local));
}
