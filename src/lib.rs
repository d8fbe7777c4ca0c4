//! Carbon-aware and deadline-aware deferral of cluster jobs, simulated tick by tick.

pub mod carbon;
pub mod cli;
pub mod config;
/// Dataset generation over paired reference and policy runs.
pub mod dataset;
pub mod error;
pub mod io;
/// Scheduling policies, slot selection and the stable queue.
pub mod scheduling;
/// Simulation driver, cluster, clock and statistics.
pub mod sim;
pub mod task;
pub mod units;
