//! trafficflow CLI
//!
//! Static traffic assignment on a road network read from CSV tables.
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::time::Duration;
use trafficflow::assignment::cost::CostFunction;
use trafficflow::assignment::utils::to_dot;
use trafficflow::assignment::{assign, Algorithm, AssignmentConfig};
use trafficflow::io::{load_network, write_results, NetworkFiles};

#[derive(Parser, Debug)]
#[command(name = "trafficflow")]
#[command(about = "Static traffic assignment (UE, SO, constrained SO) with Frank-Wolfe or MSA")]
struct Cli {
    /// Network table (init_node, term_node, capacity, length, free_flow_time, b, power, speed, toll, link_type)
    #[arg(long)]
    network: PathBuf,

    /// Demand table (init_node, term_node, demand)
    #[arg(long)]
    demand: PathBuf,

    /// Per-OD link flows of a UE solution, the starting point of a constrained run
    #[arg(long)]
    ue_link_flows: Option<PathBuf>,

    /// UE travel times per OD pair (init_node, term_node, travelTime, flow)
    #[arg(long)]
    ue_trip_times: Option<PathBuf>,

    /// Step-size rule: FW or MSA
    #[arg(long, default_value = "FW")]
    algorithm: String,

    /// Cost function: bpr, constant or greenshields
    #[arg(long, default_value = "bpr")]
    cost: String,

    /// Route on marginal costs (system optimum)
    #[arg(long)]
    system_optimal: bool,

    /// Keep every OD pair within its UE travel time (needs --ue-trip-times)
    #[arg(long)]
    cso: bool,

    /// Target relative gap
    #[arg(long, default_value_t = 1e-4)]
    accuracy: f64,

    /// Iteration limit
    #[arg(long, default_value_t = 1000)]
    max_iter: usize,

    /// Time limit in seconds
    #[arg(long, default_value_t = 60.0)]
    max_time: f64,

    /// Run the shortest path searches of different origins in parallel
    #[arg(long)]
    parallel: bool,

    /// Link result file; OD results go next to it with an `_OD_pairs` suffix
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the network with its final flows in DOT format
    #[arg(long)]
    dot: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let algorithm: Algorithm = cli.algorithm.parse()?;
    let cost_function: CostFunction = cli.cost.parse()?;
    let max_time = Duration::try_from_secs_f64(cli.max_time)
        .with_context(|| format!("invalid time limit {}", cli.max_time))?;
    let config = AssignmentConfig::default()
        .with_algorithm(algorithm)
        .with_cost_function(cost_function)
        .with_system_optimal(cli.system_optimal)
        .with_cso(cli.cso)
        .with_accuracy(cli.accuracy)
        .with_max_iter(cli.max_iter)
        .with_max_time(max_time)
        .with_parallel(cli.parallel);

    let files = NetworkFiles {
        network: cli.network.clone(),
        demand: cli.demand.clone(),
        ue_link_flows: cli.ue_link_flows.clone(),
        ue_trip_times: cli.ue_trip_times.clone(),
    };
    let mut network = load_network(&files)
        .with_context(|| format!("failed to load network {}", cli.network.display()))?;

    let result = assign(&mut network, &config)?;

    if let Some(path) = &cli.output {
        let od_path = write_results(&network, cost_function, cli.system_optimal, path)
            .with_context(|| format!("failed to write results to {}", path.display()))?;
        info!("results written to {} and {}", path.display(), od_path.display());
    }
    if let Some(path) = &cli.dot {
        std::fs::write(path, to_dot(&network))
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    println!("status\t{}", result.status);
    println!("iterations\t{}", result.iterations);
    println!("tstt\t{}", result.tstt);
    Ok(())
}
