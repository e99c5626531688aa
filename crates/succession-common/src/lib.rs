//! Succession Common - Shared types and utilities
//!
//! This crate provides the foundational pieces used across all Succession components:
//! - The coordination error type and `Result` alias
//! - Well-known namespaces and node-name prefixes
//! - Path, sequence-suffix, and service-address helpers

pub mod error;
pub mod utils;

// Re-exports for convenience
pub use error::{CoordinationError, Result};
pub use utils::{
    is_valid_path, join_path, local_host_name, local_ip, node_name, parent_path, sequence_of,
    service_address,
};

/// Default namespace under which candidates create their election nodes
pub const ELECTION_NAMESPACE: &str = "/election";

/// Default namespace under which workers publish their addresses
pub const REGISTRY_NAMESPACE: &str = "/service_registry";

/// Name prefix of election candidate nodes
pub const ELECTION_NODE_PREFIX: &str = "c_";

/// Name prefix of registry entries
pub const REGISTRY_NODE_PREFIX: &str = "n_";

/// Width of the zero-padded counter appended to sequential nodes
pub const SEQUENCE_DIGITS: usize = 10;

/// Version argument that matches any node version
pub const ANY_VERSION: i32 = -1;
