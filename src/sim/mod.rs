/// Simulation clock for tick management.
pub mod clock;
/// Cluster boundary and the reference simulation cluster.
pub mod cluster;
pub mod driver;
pub mod stats;
pub mod types;
