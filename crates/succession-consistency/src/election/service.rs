//! Leader Elector
//!
//! Election round:
//! 1. List the election namespace and rank the children by sequence number
//! 2. Lowest sequence leads; no watch is armed
//! 3. Otherwise arm an exists-watch on the immediate predecessor
//! 4. If the predecessor vanished since the listing, list again and retry
//!
//! Deletion of the watched predecessor starts a new round. Leadership is never
//! cached; every decision comes from a fresh listing.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use metrics::counter;
use parking_lot::Mutex;
use succession_common::{
    CoordinationError, ELECTION_NAMESPACE, ELECTION_NODE_PREFIX, Result, join_path, node_name,
    sequence_of,
};
use succession_coordination::{
    CoordinationClient, CreateMode, EventType, WatchedEvent, Watcher, ensure_persistent,
};
use tracing::{debug, info, warn};

use super::callback::ElectionCallback;
use super::model::{ElectionOutcome, predecessor_of, rank_candidates};

/// Runs the succession-chain election for one process.
pub struct LeaderElector {
    client: Arc<dyn CoordinationClient>,
    callback: Arc<dyn ElectionCallback>,
    namespace: String,
    /// Path of this process's election node once volunteered
    candidate: Mutex<Option<String>>,
    /// Held for a whole round so watch-triggered and direct rounds never interleave
    round: tokio::sync::Mutex<()>,
    /// Handle to ourselves, registered as the predecessor watcher
    me: Weak<LeaderElector>,
}

impl LeaderElector {
    /// Create an elector using the default election namespace.
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        callback: Arc<dyn ElectionCallback>,
    ) -> Arc<Self> {
        Self::with_namespace(client, callback, ELECTION_NAMESPACE)
    }

    pub fn with_namespace(
        client: Arc<dyn CoordinationClient>,
        callback: Arc<dyn ElectionCallback>,
        namespace: impl Into<String>,
    ) -> Arc<Self> {
        let namespace = namespace.into();
        Arc::new_cyclic(|me| Self {
            client,
            callback,
            namespace,
            candidate: Mutex::new(None),
            round: tokio::sync::Mutex::new(()),
            me: me.clone(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Path of this process's election node, if it has volunteered.
    pub fn candidate(&self) -> Option<String> {
        self.candidate.lock().clone()
    }

    /// Create the election namespace if it does not exist yet.
    pub async fn ensure_namespace(&self) -> Result<()> {
        ensure_persistent(self.client.as_ref(), &self.namespace).await?;
        Ok(())
    }

    /// Enter the election by creating this process's ephemeral-sequential node.
    ///
    /// Must be called once per process; a second call creates a second candidacy.
    pub async fn volunteer(&self) -> Result<String> {
        let prefix = join_path(&self.namespace, ELECTION_NODE_PREFIX);
        let path = self
            .client
            .create(&prefix, &[], CreateMode::EphemeralSequential)
            .await?;

        info!("Volunteered for leadership: node={}", path);
        *self.candidate.lock() = Some(path.clone());
        Ok(path)
    }

    /// Run one election round and invoke the matching callback.
    ///
    /// Rounds are serialized per elector; a caller arriving mid-round waits
    /// and then runs its own round against a fresh listing.
    pub async fn elect_leader(&self) -> Result<ElectionOutcome> {
        let _round = self.round.lock().await;
        let candidate = self.candidate().ok_or_else(|| {
            CoordinationError::IllegalState("elect_leader called before volunteer".to_string())
        })?;
        let own_name = node_name(&candidate).to_string();
        let own_sequence = sequence_of(&own_name).ok_or_else(|| {
            CoordinationError::IllegalState(format!("node without sequence suffix: {}", candidate))
        })?;

        loop {
            let children = self.client.get_children(&self.namespace, None).await?;
            let ranked = rank_candidates(children);

            if !ranked.iter().any(|c| c.name == own_name) {
                return Err(CoordinationError::NoNode(candidate));
            }

            let Some(predecessor) = predecessor_of(&ranked, own_sequence) else {
                info!("Elected to be leader: node={}", candidate);
                counter!("succession_elections_total", "outcome" => "leader").increment(1);
                self.callback.on_elected_to_be_leader().await?;
                return Ok(ElectionOutcome::Leader);
            };

            let predecessor_path = join_path(&self.namespace, &predecessor.name);
            let watcher = self.watcher()?;
            let stat = self
                .client
                .exists(&predecessor_path, Some(watcher.clone()))
                .await?;

            if stat.is_some() {
                info!(
                    "Not the leader, watching predecessor: node={}, predecessor={}",
                    candidate, predecessor_path
                );
                counter!("succession_elections_total", "outcome" => "worker").increment(1);
                self.callback.on_worker().await?;
                return Ok(ElectionOutcome::Worker {
                    predecessor: predecessor_path,
                });
            }

            warn!(
                "Predecessor vanished before watch was armed, re-listing: node={}, predecessor={}",
                candidate, predecessor_path
            );
            counter!("succession_predecessor_races_total").increment(1);

            // The watch was armed on a path that no longer exists
            self.client
                .remove_data_watch(&predecessor_path, &watcher)
                .await?;
        }
    }

    fn watcher(&self) -> Result<Arc<dyn Watcher>> {
        let me = self.me.upgrade().ok_or_else(|| {
            CoordinationError::IllegalState("elector dropped while electing".to_string())
        })?;
        Ok(me)
    }
}

#[async_trait]
impl Watcher for LeaderElector {
    async fn process(&self, event: WatchedEvent) -> Result<()> {
        match (event.event_type, event.path) {
            (EventType::NodeDeleted, Some(path)) => {
                debug!("Predecessor deleted, re-running election: predecessor={}", path);
                self.elect_leader().await?;
            }
            // The watch was consumed without the predecessor going away; re-arm it
            (EventType::NodeDataChanged, Some(path)) => {
                if self.client.exists(&path, Some(self.watcher()?)).await?.is_none() {
                    self.elect_leader().await?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}
