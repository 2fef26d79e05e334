//! # Lineage
//!
//! Command line front end for the Lineage version graph.
//!
//! - `scenario`: walk through branching, merging and conflict reporting
//! - `stress`: read one graph from many tasks while caches are evicted

use clap::{Args, Parser, Subcommand};
use lineage_graph::GraphConfig;
use scenario::run_scenario;
use stress_test::{stress_test_readers, StressConfig};
use tracing_subscriber::EnvFilter;

pub mod scenario;
pub mod stress_test;

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "lineage")]
#[command(about = "Branch-aware multi-version concurrency control for structured documents")]
#[command(version)]
struct Cli {
    /// Log graph and store internals
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk through a branching history, its merges and conflicts
    Scenario,
    /// Read one random history from many concurrent tasks
    Stress(StressArgs),
}

#[derive(Args)]
struct StressArgs {
    /// Number of concurrent reader tasks
    #[arg(long, default_value_t = 8)]
    readers: usize,
    /// Number of versions in the generated history
    #[arg(long, default_value_t = 500)]
    versions: usize,
    /// Number of branches
    #[arg(long, default_value_t = 4)]
    branches: usize,
    /// Operations per reader
    #[arg(long, default_value_t = 200)]
    rounds: usize,
    /// Evict all caches every N operations (0 disables eviction)
    #[arg(long, default_value_t = 25)]
    evict_every: usize,
    /// Seed for the history generator
    #[arg(long)]
    seed: Option<u64>,
    /// Maximum layer depth before commits flatten the graph
    #[arg(long, default_value_t = GraphConfig::default().max_layer_depth)]
    max_layer_depth: usize,
    /// Maximum number of nodes keeping cached state (0 for unbounded)
    #[arg(long, default_value_t = GraphConfig::default().cache_capacity)]
    cache_capacity: usize,
}

impl From<StressArgs> for StressConfig {
    fn from(args: StressArgs) -> Self {
        StressConfig {
            readers: args.readers,
            versions: args.versions,
            branches: args.branches,
            rounds: args.rounds,
            evict_every: args.evict_every,
            seed: args.seed,
            graph: GraphConfig {
                max_layer_depth: args.max_layer_depth,
                cache_capacity: args.cache_capacity,
            },
            ..StressConfig::default()
        }
    }
}

fn install_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("lineage=debug,lineage_graph=debug,lineage_store=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });
    // A subscriber installed by the embedding process wins.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    install_tracing(cli.verbose);

    match cli.command {
        Commands::Scenario => run_scenario()?,
        Commands::Stress(args) => {
            let rt = tokio::runtime::Runtime::new()?;
            let stats = rt.block_on(stress_test_readers(args.into()))?;
            stats.print();
            if stats.mismatches > 0 {
                return Err(format!("{} reader results differed", stats.mismatches).into());
            }
        }
    }
    Ok(())
}
