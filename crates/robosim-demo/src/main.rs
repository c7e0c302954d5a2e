use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use robosim_demo::{PUCK_FACTORY_LAYOUT, RunOptions, run};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "robosim")]
#[command(about = "Run a factory layout headless and report on its robots")]
struct Args {
    /// Layout file (RON, TOML, or JSON)
    #[arg(long, default_value = PUCK_FACTORY_LAYOUT)]
    layout: PathBuf,

    /// Simulation config file (RON, TOML, or JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Wall-clock seconds to run for
    #[arg(long, default_value_t = 10)]
    seconds: u64,

    /// Seconds between status reports
    #[arg(long, default_value_t = 1)]
    every: u64,

    /// Directory to persist the final snapshot into, as JSON
    #[arg(long)]
    store: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("robosim=info")),
        )
        .init();

    let args = Args::parse();
    let options = RunOptions {
        layout: args.layout,
        config: args.config,
        duration: Duration::from_secs(args.seconds),
        status_interval: Duration::from_secs(args.every.max(1)),
        store: args.store,
    };

    let summary = match run(&options, |elapsed, robots| {
        println!("[{:>5.1}s]", elapsed.as_secs_f64());
        for robot in robots {
            println!(
                "    {:<10} at ({:>3}, {:>3}) -> {:<18} visits={} {}",
                robot.name,
                robot.position.x,
                robot.position.y,
                robot.target.as_deref().unwrap_or("-"),
                robot.visits,
                if robot.blocked { "BLOCKED" } else { "" }
            );
        }
    }) {
        Ok(summary) => summary,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    println!("\n=== SUMMARY: {} ===", summary.factory);
    println!("    Ran {:.1}s, {} moves", summary.elapsed.as_secs_f64(), summary.moves);
    for robot in &summary.robots {
        println!(
            "    {:<10} [{:?}] visits={} final=({}, {})",
            robot.name, robot.strategy, robot.visits, robot.position.x, robot.position.y
        );
    }
    if summary.overlaps == 0 {
        println!("    Overlap check: PASS");
        ExitCode::SUCCESS
    } else {
        println!("    Overlap check: FAIL ({} overlapping pairs)", summary.overlaps);
        ExitCode::FAILURE
    }
}
