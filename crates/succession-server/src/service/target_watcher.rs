//! Continuous watch on a single path
//!
//! Watches are one-shot, so every fired event re-reads the node and re-arms
//! existence, data and children watches.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use succession_common::{CoordinationError, Result};
use succession_coordination::{CoordinationClient, EventType, WatchedEvent, Watcher};
use tracing::{debug, info};

/// What the last read of the target returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSnapshot {
    pub exists: bool,
    pub data: Vec<u8>,
    pub children: Vec<String>,
}

pub struct TargetWatcher {
    client: Arc<dyn CoordinationClient>,
    path: String,
    last: Mutex<Option<TargetSnapshot>>,
    me: Weak<TargetWatcher>,
}

impl TargetWatcher {
    pub fn new(client: Arc<dyn CoordinationClient>, path: impl Into<String>) -> Arc<Self> {
        let path = path.into();
        Arc::new_cyclic(|me| Self {
            client,
            path,
            last: Mutex::new(None),
            me: me.clone(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Snapshot taken by the most recent [`watch`](Self::watch).
    pub fn last_snapshot(&self) -> Option<TargetSnapshot> {
        self.last.lock().clone()
    }

    /// Read the target and arm all three watches.
    ///
    /// An absent node only gets an existence watch, which fires on creation.
    pub async fn watch(&self) -> Result<TargetSnapshot> {
        let watcher = self.watcher()?;

        let snapshot = match self.client.exists(&self.path, Some(watcher.clone())).await? {
            None => TargetSnapshot::default(),
            Some(_) => match self.read(watcher).await {
                Ok(snapshot) => snapshot,
                // Deleted after the existence check; the existence watch reports it
                Err(e) if e.is_no_node() => TargetSnapshot::default(),
                Err(e) => return Err(e),
            },
        };

        debug!(
            "Target watch armed: path={}, exists={}, children={:?}",
            self.path, snapshot.exists, snapshot.children
        );
        *self.last.lock() = Some(snapshot.clone());
        Ok(snapshot)
    }

    async fn read(&self, watcher: Arc<dyn Watcher>) -> Result<TargetSnapshot> {
        let (data, _) = self
            .client
            .get_data(&self.path, Some(watcher.clone()))
            .await?;
        let children = self.client.get_children(&self.path, Some(watcher)).await?;
        Ok(TargetSnapshot {
            exists: true,
            data,
            children,
        })
    }

    fn watcher(&self) -> Result<Arc<dyn Watcher>> {
        let me = self.me.upgrade().ok_or_else(|| {
            CoordinationError::IllegalState("target watcher dropped".to_string())
        })?;
        Ok(me)
    }
}

#[async_trait]
impl Watcher for TargetWatcher {
    async fn process(&self, event: WatchedEvent) -> Result<()> {
        match event.event_type {
            EventType::NodeCreated => info!("{} was created", self.path),
            EventType::NodeDeleted => info!("{} was deleted", self.path),
            EventType::NodeDataChanged => info!("{} data changed", self.path),
            EventType::NodeChildrenChanged => info!("{} children changed", self.path),
            EventType::None => return Ok(()),
        }

        self.watch().await?;
        Ok(())
    }
}
