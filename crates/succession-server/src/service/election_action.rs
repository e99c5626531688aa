//! Registry side effects of election outcomes

use std::sync::Arc;

use async_trait::async_trait;
use succession_common::Result;
use succession_consistency::ElectionCallback;
use succession_naming::ServiceRegistry;
use tracing::{debug, info};

/// Connects a participant's election results to its registry.
///
/// The leader withdraws its own address and follows membership changes;
/// a worker publishes its address once.
pub struct ElectionAction {
    registry: Arc<ServiceRegistry>,
    address: String,
}

impl ElectionAction {
    pub fn new(registry: Arc<ServiceRegistry>, address: impl Into<String>) -> Self {
        Self {
            registry,
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl ElectionCallback for ElectionAction {
    async fn on_elected_to_be_leader(&self) -> Result<()> {
        self.registry.unregister_from_cluster().await?;
        let view = self.registry.register_updates().await?;

        info!(
            "I am the leader: address={}, workers={:?}",
            self.address,
            view.addresses()
        );
        Ok(())
    }

    async fn on_worker(&self) -> Result<()> {
        // Re-confirmed after a predecessor failure
        if let Some(node) = self.registry.registration() {
            debug!("Worker already registered: node={}", node);
            return Ok(());
        }

        let node = self.registry.register_to_cluster(&self.address).await?;
        info!("I am a worker: address={}, node={}", self.address, node);
        Ok(())
    }
}
