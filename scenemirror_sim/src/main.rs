//! SceneMirror Simulator CLI
//!
//! Run deterministic client simulations against the scene-graph mirror.

use clap::Parser;
use scenemirror_core::GraphConfig;
use scenemirror_sim::scenarios::ScenarioId;
use scenemirror_sim::{MirrorExport, ScenarioResult, ScenarioRunner, SimError};
use std::path::{Path, PathBuf};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// SceneMirror deterministic simulation CLI
#[derive(Parser, Debug)]
#[command(name = "scenemirror-sim")]
#[command(about = "Run deterministic AR client simulations against a SceneMirror graph", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of simulated clients
    #[arg(short, long, default_value = "4")]
    clients: usize,

    /// Ticks to run after registration
    #[arg(short, long, default_value = "100")]
    ticks: u64,

    /// Scenario to run (steady, churn, handoff, sync, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Graph configuration as JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the final snapshot and run summary to this JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

fn load_config(path: &Path) -> Result<GraphConfig, SimError> {
    let text = std::fs::read_to_string(path)?;
    Ok(GraphConfig::from_json(&text)?)
}

fn main() {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides the level flag
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("SceneMirror Simulator v{}", env!("CARGO_PKG_VERSION"));
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(scenario) => vec![scenario],
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!("Available scenarios: steady, churn, handoff, sync, all");
                std::process::exit(1);
            }
        }
    };

    if args.export.is_some() && scenarios.len() > 1 {
        eprintln!("Error: --export only supports a single scenario, not 'all'");
        std::process::exit(1);
    }

    let config = match args.config.as_deref().map(load_config).transpose() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    let runner = ScenarioRunner::new(seed, args.clients)
        .with_ticks(args.ticks)
        .with_config(config);

    let mut results: Vec<ScenarioResult> = Vec::new();
    for scenario in &scenarios {
        let (result, mut graph) = runner.run_and_keep(*scenario);

        if let Some(path) = &args.export {
            match MirrorExport::new(&result, &mut graph).write_to_file(path) {
                Ok(()) => info!("Exported {} entities to {}", graph.len(), path.display()),
                Err(e) => {
                    error!("Failed to write export: {}", e);
                    std::process::exit(1);
                }
            }
        }

        if !args.json {
            if result.passed {
                info!(
                    "✓ {} (seed={}) PASSED | entities={} applied={}",
                    scenario.name(),
                    seed,
                    result.final_entity_count,
                    result.metrics.updates_applied
                );
            } else {
                error!(
                    "✗ {} (seed={}) FAILED: {}",
                    scenario.name(),
                    seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
        results.push(result);
    }

    let total = results.len();
    let failed = results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed,
            "failed": failed,
            "results": results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "ticks": r.total_ticks,
                    "entities": r.final_entity_count,
                    "stats": r.stats,
                    "metrics": r.metrics,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to encode summary: {}", e),
        }
    } else if failed == 0 {
        info!("All {} scenario runs passed", total);
    } else {
        error!("{}/{} scenario runs failed", failed, total);
    }

    if failed > 0 {
        std::process::exit(1);
    }
}
