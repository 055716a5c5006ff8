//! startup-time - benchmark the startup time of many language runtimes
//!
//! This is the main entry point for the startup-time CLI tool.

mod builder;
mod cli;
mod config;
mod errors;
mod graph;
mod logger;
mod registry;
mod report;
mod runner;
mod utils;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

use crate::builder::Builder;
use crate::cli::Cli;
use crate::config::{Action, Config, Format, Verbosity};
use crate::errors::get_exit_code;
use crate::logger::setup_logging;
use crate::registry::Registry;
use crate::runner::{Runner, runnable_tests};

/// Package version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();
    let config = Config::from_cli(&cli);

    if let Err(err) = run(&config) {
        eprintln!("Error: {:#}", err);
        std::process::exit(get_exit_code(&err));
    }
}

/// Perform the action selected on the command line
fn run(config: &Config) -> Result<()> {
    let _guard = setup_logging(config.verbosity)?;

    debug!(version = VERSION, action = ?config.action, "startup-time starting");

    match config.action {
        Action::Clean => Builder::new(config).clean(),
        Action::ShowIds => show_ids(config),
        Action::Benchmark => benchmark(config),
    }
}

fn load_registry(config: &Config) -> Result<Registry> {
    let registry = Registry::load(&config.catalog)
        .with_context(|| format!("Failed to load tests from {}", config.catalog.display()))?;
    debug!(tests = registry.len(), "Loaded test catalog");
    Ok(registry)
}

/// Print the IDs and groups accepted by --only and --omit
fn show_ids(config: &Config) -> Result<()> {
    let registry = load_registry(config)?;
    let pairs = registry.ids_to_groups();

    match config.format {
        Format::Json => println!("{}", report::ids_to_groups_json(&pairs)?),
        Format::Table => print!("{}", report::ids_to_groups_table(&pairs)),
    }

    Ok(())
}

/// Run the selected benchmark tests:
///
/// 1) bring the build directory up to date
/// 2) run the runnable tests in random order and time each one
/// 3) print the results from fastest to slowest
fn benchmark(config: &Config) -> Result<()> {
    let registry = load_registry(config)?;
    let selected = registry.select(&config.only, &config.omit)?;

    let resolution = Builder::new(config).build(&registry, &selected)?;
    let tests = runnable_tests(&selected, &resolution, &config.build_dir);

    info!(
        selected = selected.len(),
        runnable = tests.len(),
        "Running benchmarks"
    );

    let results = Runner::new(config).run(tests)?;

    match config.format {
        Format::Json => println!("{}", report::results_to_json(&results)?),
        Format::Table if results.is_empty() => {}
        Format::Table => {
            if config.verbosity != Verbosity::Quiet {
                println!();
            }
            print!("{}", report::results_to_table(&results));
        }
    }

    Ok(())
}
