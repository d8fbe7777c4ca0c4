//! TOML-based scenario configuration and preset definitions.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::dataset::{PolicySelection, UNLIMITED_CPUS};
use crate::sim::types::SimConfig;
use crate::task::WaitingTimes;
use crate::units::TICKS_PER_HOUR;

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the baseline scenario. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Simulation horizon, window width and seed.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Dataset sampling and trace selection.
    #[serde(default)]
    pub dataset: DatasetConfig,
}

/// Simulation timing and global parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Observed horizon in hours (must be > 0).
    pub duration_hours: usize,
    /// Aggregation window width in minutes (must divide an hour).
    pub window_minutes: usize,
    /// Master random seed.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            duration_hours: 48,
            window_minutes: 5,
            seed: 42,
        }
    }
}

impl SimulationConfig {
    /// Timing for one run at the trace resolution.
    ///
    /// Call only on a validated configuration.
    pub fn sim_config(&self) -> SimConfig {
        SimConfig::new(
            TICKS_PER_HOUR,
            self.duration_hours,
            self.window_minutes * TICKS_PER_HOUR / 60,
        )
    }
}

/// Dataset generation parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatasetConfig {
    /// Samples per policy key.
    pub num_samples: usize,
    /// Tasks drawn per sample.
    pub num_tasks: usize,
    /// Task trace name, read from `<trace_dir>/<task_trace>.csv`.
    pub task_trace: String,
    /// Waiting budgets as `"<short>x<long>"` hours.
    pub waiting_times: String,
    /// Carbon trace name, read from `<trace_dir>/<carbon_trace>.csv`.
    pub carbon_trace: String,
    /// Use the built-in constant series instead of a carbon trace.
    pub custom_carbon: bool,
    /// Reserved CPUs; demand above this is on-demand.
    pub reserved_instances: u64,
    /// `"all"`, `"baseline"` or a comma list of `sched_carbon` keys.
    pub policies: String,
    pub trace_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Largest carbon start index (hours) drawn per sample.
    pub max_carbon_start: usize,
    /// Trace size below which sampling is refused.
    pub min_tasks: usize,
    /// Worker threads per key; 0 uses the available parallelism.
    pub threads: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            num_samples: 10,
            num_tasks: 10_000,
            task_trace: "pai_1k".to_string(),
            waiting_times: "0x0".to_string(),
            carbon_trace: "AU-SA".to_string(),
            custom_carbon: false,
            reserved_instances: UNLIMITED_CPUS,
            policies: "all".to_string(),
            trace_dir: PathBuf::from("traces"),
            output_dir: PathBuf::from("datasets"),
            max_carbon_start: 8500,
            min_tasks: 0,
            threads: 0,
        }
    }
}

impl DatasetConfig {
    /// Worker count, resolving 0 to the machine's parallelism.
    pub fn worker_threads(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        std::thread::available_parallelism().map_or(1, |n| n.get())
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"dataset.num_tasks"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl ScenarioConfig {
    /// Returns the baseline scenario: the full 48-hour sweep over all keys.
    pub fn baseline() -> Self {
        Self::default()
    }

    /// Returns the smoke preset: a few small samples on the built-in
    /// carbon series, for checking a trace end to end.
    pub fn smoke() -> Self {
        Self {
            simulation: SimulationConfig {
                duration_hours: 24,
                ..SimulationConfig::default()
            },
            dataset: DatasetConfig {
                num_samples: 2,
                num_tasks: 500,
                custom_carbon: true,
                policies: "baseline".to_string(),
                max_carbon_start: 0,
                ..DatasetConfig::default()
            },
        }
    }

    /// Returns the deferral preset: generous waiting budgets on the
    /// comparison set of policies.
    pub fn deferral() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            dataset: DatasetConfig {
                waiting_times: "6x24".to_string(),
                policies: "baseline".to_string(),
                ..DatasetConfig::default()
            },
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "smoke", "deferral"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "smoke" => Ok(Self::smoke()),
            "deferral" => Ok(Self::deferral()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("config", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Parsed policy selection; call after [`validate`](Self::validate).
    ///
    /// # Errors
    ///
    /// Returns the selector's parse error.
    pub fn policy_selection(&self) -> Result<PolicySelection, ConfigError> {
        self.dataset
            .policies
            .parse()
            .map_err(|e: crate::error::Error| ConfigError::new("dataset.policies", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.simulation;

        if s.duration_hours == 0 {
            errors.push(ConfigError::new("simulation.duration_hours", "must be > 0"));
        }
        if s.window_minutes == 0 || 60 % s.window_minutes != 0 {
            errors.push(ConfigError::new(
                "simulation.window_minutes",
                format!("must divide 60, got {}", s.window_minutes),
            ));
        }

        let d = &self.dataset;
        if d.num_samples == 0 {
            errors.push(ConfigError::new("dataset.num_samples", "must be > 0"));
        }
        if d.num_tasks == 0 {
            errors.push(ConfigError::new("dataset.num_tasks", "must be > 0"));
        }
        if d.waiting_times.parse::<WaitingTimes>().is_err() {
            errors.push(ConfigError::new(
                "dataset.waiting_times",
                format!(
                    "must look like \"<short>x<long>\" hours, got \"{}\"",
                    d.waiting_times
                ),
            ));
        }
        if let Err(e) = self.policy_selection() {
            errors.push(e);
        }
        if d.reserved_instances == 0 {
            errors.push(ConfigError::new("dataset.reserved_instances", "must be > 0"));
        }
        if !d.custom_carbon && d.carbon_trace.trim().is_empty() {
            errors.push(ConfigError::new(
                "dataset.carbon_trace",
                "must name a trace unless custom_carbon is set",
            ));
        }
        if d.task_trace.trim().is_empty() {
            errors.push(ConfigError::new("dataset.task_trace", "must not be empty"));
        }

        errors
    }
}
