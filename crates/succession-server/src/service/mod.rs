//! Node services: election actions, session handling, watches and the cluster runner.

pub mod cluster;
pub mod connection_watcher;
pub mod election_action;
pub mod target_watcher;

pub use cluster::{Cluster, ClusterSettings, Participant};
pub use connection_watcher::ConnectionWatcher;
pub use election_action::ElectionAction;
pub use target_watcher::{TargetSnapshot, TargetWatcher};
