//! Dataset generator entry point: CLI wiring and config-driven generation.

use std::process;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use deferrable_sim::cli::Cli;
use deferrable_sim::config::ScenarioConfig;
use deferrable_sim::dataset::{self, SampleContext};
use deferrable_sim::error::Error;
use deferrable_sim::io::export::{dataset_path, export_summary_csv, write_dataset};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Generates one dataset per selected policy key.
fn generate_all(cfg: &ScenarioConfig) -> Result<(), Error> {
    let selection = cfg.policy_selection()?;
    let ctx = SampleContext::from_config(cfg)?;
    let d = &cfg.dataset;
    let threads = d.worker_threads();

    info!(
        policies = %selection,
        waiting = %d.waiting_times,
        reserved = d.reserved_instances,
        "starting generation"
    );

    for key in selection.keys() {
        if selection.skips_existing() && dataset_path(&d.output_dir, key).exists() {
            warn!(%key, "dataset already exists, skipping");
            continue;
        }
        let rows = dataset::generate(&ctx, key, d.num_samples, cfg.simulation.seed, threads)?;
        let path = write_dataset(&d.output_dir, key, &rows)?;
        export_summary_csv(&d.output_dir, key, &rows)?;
        info!(%key, path = %path.display(), rows = rows.len(), "saved dataset");
    }
    Ok(())
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let scenario = match cli.scenario() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("{e}");
        }
        process::exit(1);
    }

    if let Err(e) = generate_all(&scenario) {
        error!("{e}");
        process::exit(1);
    }
}
