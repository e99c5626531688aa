//! Session state handling for a participant

use async_trait::async_trait;
use succession_common::Result;
use succession_coordination::{EventType, KeeperState, WatchedEvent, Watcher};
use tracing::{info, warn};

use crate::startup::ShutdownSignal;

/// Default watcher of a participant's session.
///
/// Fires the participant's shutdown signal once the session is lost.
pub struct ConnectionWatcher {
    name: String,
    shutdown: ShutdownSignal,
}

impl ConnectionWatcher {
    pub fn new(name: impl Into<String>, shutdown: ShutdownSignal) -> Self {
        Self {
            name: name.into(),
            shutdown,
        }
    }
}

#[async_trait]
impl Watcher for ConnectionWatcher {
    async fn process(&self, event: WatchedEvent) -> Result<()> {
        if event.event_type != EventType::None {
            return Ok(());
        }

        match event.state {
            KeeperState::SyncConnected => {
                info!("Successfully connected: participant={}", self.name);
            }
            state => {
                if self.shutdown.shutdown() {
                    warn!(
                        "Disconnected from coordination service: participant={}, state={:?}",
                        self.name, state
                    );
                }
            }
        }
        Ok(())
    }
}
