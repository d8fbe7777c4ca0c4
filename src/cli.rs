//! Command-line surface of the dataset generator.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{ConfigError, ScenarioConfig};

/// Generate carbon-aware scheduling datasets from job and carbon traces.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Load the scenario from a TOML config file
    #[arg(long, value_name = "PATH", conflicts_with = "preset")]
    pub config: Option<PathBuf>,

    /// Start from a built-in preset (baseline, smoke, deferral)
    #[arg(long)]
    pub preset: Option<String>,

    /// Samples per policy key
    #[arg(short = 'n', long)]
    pub num_samples: Option<usize>,

    /// Tasks drawn per sample
    #[arg(short = 'k', long)]
    pub num_tasks: Option<usize>,

    /// Task trace name under the trace directory
    #[arg(short = 't', long)]
    pub task_trace: Option<String>,

    /// Waiting budgets as <short>x<long> hours
    #[arg(short = 'w', long)]
    pub waiting_times: Option<String>,

    /// Carbon trace name under the trace directory
    #[arg(short = 'c', long)]
    pub carbon_trace: Option<String>,

    /// Use the built-in constant carbon series
    #[arg(long = "ca")]
    pub custom_carbon: bool,

    /// Directory receiving <key>_dataset.json files
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// all, baseline, or a comma list of sched_carbon keys
    #[arg(short = 'p', long)]
    pub policies: Option<String>,

    /// Reserved CPUs in the simulated cluster
    #[arg(short = 'r', long = "reserve-instances")]
    pub reserved_instances: Option<u64>,

    /// Override the random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Directory holding task and carbon traces
    #[arg(long)]
    pub trace_dir: Option<PathBuf>,

    /// Worker threads per policy key (0 = all cores)
    #[arg(long)]
    pub threads: Option<usize>,
}

impl Cli {
    /// Builds the scenario: config file or preset first, then flag overrides.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file or preset cannot be loaded.
    pub fn scenario(&self) -> Result<ScenarioConfig, ConfigError> {
        let mut cfg = match (&self.config, &self.preset) {
            (Some(path), _) => ScenarioConfig::from_toml_file(path)?,
            (None, Some(name)) => ScenarioConfig::from_preset(name)?,
            (None, None) => ScenarioConfig::baseline(),
        };
        self.apply_overrides(&mut cfg);
        Ok(cfg)
    }

    fn apply_overrides(&self, cfg: &mut ScenarioConfig) {
        let d = &mut cfg.dataset;
        if let Some(n) = self.num_samples {
            d.num_samples = n;
        }
        if let Some(k) = self.num_tasks {
            d.num_tasks = k;
        }
        if let Some(t) = &self.task_trace {
            d.task_trace = t.clone();
        }
        if let Some(w) = &self.waiting_times {
            d.waiting_times = w.clone();
        }
        if let Some(c) = &self.carbon_trace {
            d.carbon_trace = c.clone();
        }
        if self.custom_carbon {
            d.custom_carbon = true;
        }
        if let Some(o) = &self.output_dir {
            d.output_dir = o.clone();
        }
        if let Some(p) = &self.policies {
            d.policies = p.clone();
        }
        if let Some(r) = self.reserved_instances {
            d.reserved_instances = r;
        }
        if let Some(dir) = &self.trace_dir {
            d.trace_dir = dir.clone();
        }
        if let Some(n) = self.threads {
            d.threads = n;
        }
        if let Some(seed) = self.seed {
            cfg.simulation.seed = seed;
        }
    }
}
