//! Succession Consistency - leader election
//!
//! This crate provides:
//! - `LeaderElector`: succession-chain election over ephemeral-sequential nodes
//! - `ElectionCallback`: hooks run when a candidate is promoted or confirmed as worker
//! - Candidate ranking and predecessor selection

pub mod election;

// Re-export election types
pub use election::{
    Candidate, ElectionCallback, ElectionOutcome, LeaderElector, predecessor_of, rank_candidates,
};
