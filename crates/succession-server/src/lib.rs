//! Succession node library
//!
//! Configuration, logging, shutdown handling, and the in-process cluster
//! runner built on the election and registry crates.

pub mod metrics; // Metric descriptions
pub mod model; // Configuration
pub mod service; // Election actions, watchers and the cluster runner
pub mod startup; // Logging and shutdown

pub use model::{Cli, Configuration};
pub use service::{Cluster, ClusterSettings};
