//! Election callback boundary

use async_trait::async_trait;
use succession_common::Result;

/// Hooks invoked by [`LeaderElector`](super::LeaderElector) at the end of every election round.
///
/// Keeps registry side effects out of the election logic. Both hooks run on
/// the thread driving the election, so they should not block for long.
#[async_trait]
pub trait ElectionCallback: Send + Sync {
    /// Called when this candidate holds the lowest sequence number.
    async fn on_elected_to_be_leader(&self) -> Result<()>;

    /// Called once a watch is armed on this candidate's predecessor.
    async fn on_worker(&self) -> Result<()>;
}
