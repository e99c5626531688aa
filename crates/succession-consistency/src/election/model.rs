//! Election data model

use succession_common::sequence_of;

/// A child of the election namespace carrying a sequence suffix.
///
/// Ordering is by sequence number first, so a sorted list is the succession chain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Candidate {
    pub sequence: u64,
    pub name: String,
}

/// Result of one election round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// This candidate holds the lowest sequence number
    Leader,
    /// This candidate is watching the given predecessor path
    Worker { predecessor: String },
}

impl ElectionOutcome {
    pub fn is_leader(&self) -> bool {
        matches!(self, ElectionOutcome::Leader)
    }
}

/// Sort election children into succession order, dropping names without a sequence suffix.
pub fn rank_candidates(children: Vec<String>) -> Vec<Candidate> {
    let mut ranked: Vec<Candidate> = children
        .into_iter()
        .filter_map(|name| sequence_of(&name).map(|sequence| Candidate { sequence, name }))
        .collect();
    ranked.sort();
    ranked
}

/// The candidate with the largest sequence number below `sequence`.
pub fn predecessor_of(ranked: &[Candidate], sequence: u64) -> Option<&Candidate> {
    let idx = ranked.partition_point(|c| c.sequence < sequence);
    idx.checked_sub(1).map(|i| &ranked[i])
}
