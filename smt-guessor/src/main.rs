use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use smt_guessor::guess_map::verify_traces;
use smt_guessor::oracle::CadicalOracle;
use smt_guessor::trace::build_trace_model;
use smt_guessor::{sweep_parallel, GuessError, PortCompletion, RoomRange, SolveOptions, TraceInput};
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "smt-guessor")]
#[command(about = "Reconstruct a library map from explore traces with SAT-based refinement")]
struct Cli {
    /// Explore log: {"plans": [...], "results": [[...], ...]}
    #[arg(long, env = "GUESSOR_INPUT")]
    input: PathBuf,

    /// Where to write the map JSON (stdout if omitted)
    #[arg(long, env = "GUESSOR_OUTPUT")]
    output: Option<PathBuf>,

    /// Try exactly this many rooms
    #[arg(long, env = "GUESSOR_ROOMS")]
    rooms: Option<usize>,

    #[arg(long, env = "GUESSOR_MIN_ROOMS", default_value_t = 1)]
    min_rooms: usize,

    #[arg(long, env = "GUESSOR_MAX_ROOMS", default_value_t = 128)]
    max_rooms: usize,

    /// Skip the up-front same-door determinism clauses
    #[arg(long)]
    no_seed_local_det: bool,

    /// none | fill
    #[arg(long, env = "GUESSOR_COMPLETE_PORTS", default_value = "fill")]
    complete_ports: PortCompletion,

    #[arg(long, env = "GUESSOR_MAX_ITERATIONS")]
    max_iterations: Option<usize>,

    /// Conflict budget per SAT call
    #[arg(long, env = "GUESSOR_CONFLICT_LIMIT")]
    conflict_limit: Option<i32>,

    #[arg(long, env = "GUESSOR_PROGRESS_EVERY", default_value_t = 1)]
    progress_every: usize,

    /// Room counts solved concurrently
    #[arg(long, env = "GUESSOR_JOBS", default_value_t = 1)]
    jobs: usize,

    /// Replay every trace over the result before printing it
    #[arg(long)]
    verify: bool,

    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn range(&self) -> RoomRange {
        match self.rooms {
            Some(k) => RoomRange::exact(k),
            None => RoomRange::new(self.min_rooms, self.max_rooms),
        }
    }

    fn options(&self) -> SolveOptions {
        SolveOptions {
            seed_determinism: !self.no_seed_local_det,
            port_completion: self.complete_ports,
            max_iterations: self.max_iterations,
            conflict_limit: self.conflict_limit,
            progress_every: self.progress_every,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tokio::spawn(async {
        if let Ok(()) = signal::ctrl_c().await {
            tracing::warn!("Received Ctrl+C, giving up");
            std::process::exit(130); // Exit with SIGINT status
        }
    });

    let raw = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;
    let input: TraceInput = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", cli.input.display()))?;
    let trace = Arc::new(build_trace_model(&input).context("rejected explore log")?);
    tracing::info!(
        "traces={} nodes={} steps={}",
        trace.plans.len(),
        trace.node_count(),
        trace.steps.len()
    );

    let range = cli.range();
    let options = cli.options();
    let limit = options.conflict_limit;
    let result = sweep_parallel(
        trace.clone(),
        range,
        options,
        move |_| CadicalOracle::new(limit),
        cli.jobs,
    )
    .await;

    let found = match result {
        Ok(found) => found,
        Err(e @ GuessError::InvariantDecodeFailure(_)) => return Err(e.into()),
        Err(e) => {
            println!("{}", serde_json::json!({ "error": e.to_string() }));
            std::process::exit(2);
        }
    };
    tracing::info!(
        "rooms={} iterations={} clauses={} edges={}",
        found.solution.rooms,
        found.solution.iterations,
        found.solution.clauses,
        found.stats.edges
    );

    if cli.verify {
        if cli.complete_ports == PortCompletion::Fill {
            found.map.check_matching().context("port matching check failed")?;
        }
        if let Err(e) = verify_traces(&found.map, &trace) {
            bail!("replay check failed: {}", e);
        }
        tracing::info!("verified {} traces", trace.plans.len());
    }

    let json = serde_json::to_string_pretty(&found.map)?;
    match &cli.output {
        Some(path) => std::fs::write(path, json + "\n")
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{}", json),
    }

    Ok(())
}
