//! Error types shared by the scheduling engine and the simulation driver.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::units::Tick;

/// Failure to derive a schedule for a job.
///
/// None of these are retried; they surface to the driver, which aborts the
/// run for the affected job.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulingError {
    /// The carbon window is shorter than the horizon the job needs.
    #[error("insufficient carbon data: need {need} samples, got {got}")]
    InsufficientData { need: usize, got: usize },

    /// The threshold rule cannot finish the job before its deadline.
    #[error("cannot fit job of length {length} within waiting budget {waiting}")]
    DeadlineInfeasible { length: usize, waiting: usize },

    /// A window was requested outside the available trace.
    #[error("window [{start}, {end}) is out of range for trace of length {len}")]
    OutOfRange { start: usize, end: usize, len: usize },
}

/// Failure that terminates a simulation run.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// A job could not be scheduled; the run stops rather than lose it.
    #[error("job {task_id} could not be scheduled at tick {tick}: {source}")]
    Submission {
        task_id: u64,
        tick: Tick,
        #[source]
        source: SchedulingError,
    },
}

/// Crate-level error used by loaders, dataset generation and the binary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot read \"{path}\": {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed trace \"{path}\": {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("trace \"{path}\" is missing column \"{column}\"")]
    MissingColumn { path: PathBuf, column: String },

    #[error("trace \"{path}\" has no usable rows")]
    EmptyTrace { path: PathBuf },

    #[error("invalid waiting-time spec \"{0}\" (expected <short>x<long> hours)")]
    WaitingTimes(String),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("invalid policy selection: {0}")]
    Policy(String),

    #[error("dataset sample invalid: {0}")]
    Sample(String),

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error("cannot write dataset: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot write \"{path}\": {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
