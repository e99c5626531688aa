//! Coordination client and watcher traits

use std::sync::Arc;

use async_trait::async_trait;
use succession_common::Result;
use tracing::debug;

use crate::model::{CreateMode, Stat, WatchedEvent};

/// Receiver of fired watches.
///
/// Every registration fires at most once. A watcher that wants to keep
/// observing a path must register again while handling the event.
#[async_trait]
pub trait Watcher: Send + Sync + 'static {
    async fn process(&self, event: WatchedEvent) -> Result<()>;
}

/// A watcher that invokes a closure.
pub struct FnWatcher<F>
where
    F: Fn(WatchedEvent) + Send + Sync + 'static,
{
    f: F,
}

impl<F> FnWatcher<F>
where
    F: Fn(WatchedEvent) + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Watcher for FnWatcher<F>
where
    F: Fn(WatchedEvent) + Send + Sync + 'static,
{
    async fn process(&self, event: WatchedEvent) -> Result<()> {
        (self.f)(event);
        Ok(())
    }
}

/// Session-scoped client of a hierarchical coordination store.
///
/// Each call is one round trip. Passing a watcher registers a one-shot
/// subscription in the same round trip as the read it accompanies.
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Identifier of the session; ephemeral nodes record it as their owner.
    fn session_id(&self) -> u64;

    /// Create a node and return its actual path (sequential modes append a counter).
    async fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> Result<String>;

    /// Delete a node; `version` of -1 deletes unconditionally.
    async fn delete(&self, path: &str, version: i32) -> Result<()>;

    /// Node metadata, or `None` when absent. The watcher is armed either way.
    async fn exists(&self, path: &str, watcher: Option<Arc<dyn Watcher>>) -> Result<Option<Stat>>;

    /// Child names of a node.
    async fn get_children(
        &self,
        path: &str,
        watcher: Option<Arc<dyn Watcher>>,
    ) -> Result<Vec<String>>;

    /// Payload and metadata of a node.
    async fn get_data(
        &self,
        path: &str,
        watcher: Option<Arc<dyn Watcher>>,
    ) -> Result<(Vec<u8>, Stat)>;

    /// Replace the payload of a node; `version` of -1 matches any version.
    async fn set_data(&self, path: &str, data: &[u8], version: i32) -> Result<Stat>;

    /// Drop a pending data watch this session armed with `watcher` on `path`.
    ///
    /// Returns `false` when no such watch was pending.
    async fn remove_data_watch(&self, path: &str, watcher: &Arc<dyn Watcher>) -> Result<bool>;
}

/// Create a persistent, empty node unless it already exists.
///
/// Losing a concurrent create race counts as success. Returns `true` when
/// this call created the node.
pub async fn ensure_persistent(client: &dyn CoordinationClient, path: &str) -> Result<bool> {
    if client.exists(path, None).await?.is_some() {
        return Ok(false);
    }
    match client.create(path, &[], CreateMode::Persistent).await {
        Ok(_) => {
            debug!("Created persistent node: {}", path);
            Ok(true)
        }
        Err(e) if e.is_node_exists() => {
            debug!("Persistent node created concurrently: {}", path);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
