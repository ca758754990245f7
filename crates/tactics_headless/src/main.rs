//! Headless hex tactics runner.
//!
//! # Usage
//!
//! ```bash
//! # Run a scenario and print boards and events
//! cargo run -p tactics_headless -- run scenarios/chain_reaction.ron
//!
//! # Emit the event log as JSON lines
//! cargo run -p tactics_headless -- run scenarios/chain_reaction.ron --json
//!
//! # Validate a scenario without running it
//! cargo run -p tactics_headless -- validate scenarios/chain_reaction.ron
//!
//! # Run a scenario several times and compare state hashes
//! cargo run -p tactics_headless -- verify scenarios/chain_reaction.ron --runs 5
//! ```
//!
//! Logs go to stderr and honor `RUST_LOG`.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tactics_headless::{
    ascii::{render_board, AsciiConfig},
    runner::{HeadlessConfig, ScenarioRunner},
    scenario::Scenario,
};

#[derive(Parser)]
#[command(name = "tactics_headless")]
#[command(about = "Headless hex tactics scenario runner")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario
    Run {
        /// Scenario file to load
        scenario: PathBuf,

        /// Print the event log as JSON lines instead of text
        #[arg(long)]
        json: bool,

        /// Color occupants by health
        #[arg(long)]
        color: bool,

        /// Tick cap for each settle
        #[arg(long, default_value = "10000")]
        max_ticks: u64,
    },

    /// Check a scenario and print its starting board
    Validate {
        /// Scenario file to load
        scenario: PathBuf,
    },

    /// Run a scenario several times and compare final state hashes
    Verify {
        /// Scenario file to load
        scenario: PathBuf,

        /// Number of runs
        #[arg(short, long, default_value = "3")]
        runs: u32,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    let result = match cli.command {
        Commands::Run {
            scenario,
            json,
            color,
            max_ticks,
        } => cmd_run(&scenario, json, color, max_ticks),
        Commands::Validate { scenario } => cmd_validate(&scenario),
        Commands::Verify { scenario, runs } => cmd_verify(&scenario, runs),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn load(path: &Path) -> Result<Scenario, String> {
    Scenario::load(path).map_err(|e| e.to_string())
}

/// Run a scenario and print the report
fn cmd_run(path: &Path, json: bool, color: bool, max_ticks: u64) -> Result<(), String> {
    let scenario = load(path)?;
    let runner = ScenarioRunner::with_config(HeadlessConfig {
        max_settle_ticks: max_ticks,
        ascii: AsciiConfig {
            use_color: color,
            ..AsciiConfig::default()
        },
    });
    let report = runner.run(&scenario).map_err(|e| e.to_string())?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let written = if json {
        report.write_json(&mut out)
    } else {
        report.write_text(&mut out)
    };
    written.and_then(|()| out.flush()).map_err(|e| e.to_string())
}

/// Validate a scenario and show its starting board
fn cmd_validate(path: &Path) -> Result<(), String> {
    let scenario = load(path)?;
    let (sim, names) = scenario.build().map_err(|e| e.to_string())?;
    println!(
        "OK: {} ({} tiles, {} occupants, {} actions)",
        scenario.name,
        sim.graph().tile_count(),
        names.len(),
        scenario.actions.len()
    );
    print!("{}", render_board(&sim, &AsciiConfig::default()));
    Ok(())
}

/// Verify determinism by running the same scenario several times
fn cmd_verify(path: &Path, runs: u32) -> Result<(), String> {
    let scenario = load(path)?;
    tracing::info!("Verifying determinism: {} ({} runs)", scenario.name, runs);

    let runner = ScenarioRunner::new();
    let mut hashes = Vec::new();
    for _ in 0..runs.max(1) {
        let report = runner.run(&scenario).map_err(|e| e.to_string())?;
        hashes.push(report.state_hash);
    }

    if hashes.windows(2).all(|w| w[0] == w[1]) {
        eprintln!("PASS: All {} runs produced identical results", hashes.len());
        Ok(())
    } else {
        Err(format!("Non-determinism detected: {hashes:x?}"))
    }
}
