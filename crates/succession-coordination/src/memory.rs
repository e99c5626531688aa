//! In-process coordination ensemble
//!
//! A single-process implementation of the hierarchical store contract:
//! persistent and ephemeral nodes, per-parent sequence counters, one-shot
//! data and child watches, and session expiry that removes ephemerals.
//! Sessions connected to the same `MemoryEnsemble` observe one linearizable
//! tree, which makes it usable both in tests and for in-process clusters.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use succession_common::{
    ANY_VERSION, CoordinationError, Result, SEQUENCE_DIGITS, is_valid_path, node_name, parent_path,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::client::{CoordinationClient, Watcher};
use crate::dispatch::{Delivery, EventDispatcher};
use crate::model::{CreateMode, EventType, KeeperState, Stat, WatchedEvent};

pub type SessionId = u64;

struct ZNode {
    data: Vec<u8>,
    stat: Stat,
    children: BTreeSet<String>,
    /// Next counter handed to a sequential child
    next_sequence: u64,
}

impl ZNode {
    fn new(data: Vec<u8>, stat: Stat) -> Self {
        Self {
            data,
            stat,
            children: BTreeSet::new(),
            next_sequence: 0,
        }
    }
}

struct Registration {
    session: SessionId,
    watcher: Arc<dyn Watcher>,
}

struct SessionEntry {
    sender: mpsc::UnboundedSender<Delivery>,
    default_watcher: Arc<dyn Watcher>,
    ephemerals: BTreeSet<String>,
}

struct EnsembleState {
    nodes: HashMap<String, ZNode>,
    sessions: HashMap<SessionId, SessionEntry>,
    data_watches: HashMap<String, Vec<Registration>>,
    child_watches: HashMap<String, Vec<Registration>>,
    zxid: u64,
    last_session: SessionId,
}

impl EnsembleState {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), ZNode::new(Vec::new(), Stat::default()));
        Self {
            nodes,
            sessions: HashMap::new(),
            data_watches: HashMap::new(),
            child_watches: HashMap::new(),
            zxid: 0,
            last_session: 0,
        }
    }

    fn check_session(&self, session: SessionId) -> Result<()> {
        if self.sessions.contains_key(&session) {
            Ok(())
        } else {
            Err(CoordinationError::SessionExpired)
        }
    }

    fn check_path(path: &str) -> Result<()> {
        if is_valid_path(path) {
            Ok(())
        } else {
            Err(CoordinationError::BadArguments(format!(
                "invalid path: {:?}",
                path
            )))
        }
    }

    fn next_zxid(&mut self) -> u64 {
        self.zxid += 1;
        self.zxid
    }

    fn create(
        &mut self,
        session: SessionId,
        path: &str,
        data: &[u8],
        mode: CreateMode,
    ) -> Result<String> {
        self.check_session(session)?;
        Self::check_path(path)?;
        let parent = parent_path(path).ok_or_else(|| CoordinationError::NodeExists("/".into()))?;

        let parent_node = self
            .nodes
            .get_mut(parent)
            .ok_or_else(|| CoordinationError::NoNode(parent.to_string()))?;
        if parent_node.stat.ephemeral_owner != 0 {
            return Err(CoordinationError::NoChildrenForEphemerals(
                parent.to_string(),
            ));
        }

        let actual = if mode.is_sequential() {
            let sequence = parent_node.next_sequence;
            parent_node.next_sequence += 1;
            format!("{}{:0width$}", path, sequence, width = SEQUENCE_DIGITS)
        } else {
            path.to_string()
        };

        if self.nodes.contains_key(&actual) {
            return Err(CoordinationError::NodeExists(actual));
        }

        let zxid = self.next_zxid();
        let stat = Stat {
            czxid: zxid,
            mzxid: zxid,
            ephemeral_owner: if mode.is_ephemeral() { session } else { 0 },
            data_length: data.len(),
            ..Default::default()
        };

        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.insert(node_name(&actual).to_string());
            parent_node.stat.cversion += 1;
            parent_node.stat.num_children = parent_node.children.len();
        }
        self.nodes
            .insert(actual.clone(), ZNode::new(data.to_vec(), stat));

        if mode.is_ephemeral()
            && let Some(entry) = self.sessions.get_mut(&session)
        {
            entry.ephemerals.insert(actual.clone());
        }

        self.fire_data(&actual, EventType::NodeCreated);
        self.fire_children(parent, EventType::NodeChildrenChanged);

        Ok(actual)
    }

    fn delete(&mut self, session: SessionId, path: &str, version: i32) -> Result<()> {
        self.check_session(session)?;
        Self::check_path(path)?;
        if path == "/" {
            return Err(CoordinationError::BadArguments(
                "cannot delete the root node".to_string(),
            ));
        }

        let node = self
            .nodes
            .get(path)
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))?;
        if version != ANY_VERSION && version != node.stat.version {
            return Err(CoordinationError::BadVersion {
                path: path.to_string(),
                expected: version,
                actual: node.stat.version,
            });
        }
        if !node.children.is_empty() {
            return Err(CoordinationError::NotEmpty(path.to_string()));
        }

        self.remove_node(path);
        Ok(())
    }

    /// Remove a childless node and fire the resulting watches.
    fn remove_node(&mut self, path: &str) {
        let Some(node) = self.nodes.remove(path) else {
            return;
        };
        self.next_zxid();

        let parent = parent_path(path).unwrap_or("/").to_string();
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.remove(node_name(path));
            parent_node.stat.cversion += 1;
            parent_node.stat.num_children = parent_node.children.len();
        }

        if node.stat.ephemeral_owner != 0
            && let Some(entry) = self.sessions.get_mut(&node.stat.ephemeral_owner)
        {
            entry.ephemerals.remove(path);
        }

        self.fire_data(path, EventType::NodeDeleted);
        self.fire_children(path, EventType::NodeDeleted);
        self.fire_children(&parent, EventType::NodeChildrenChanged);
    }

    fn exists(
        &mut self,
        session: SessionId,
        path: &str,
        watcher: Option<Arc<dyn Watcher>>,
    ) -> Result<Option<Stat>> {
        self.check_session(session)?;
        Self::check_path(path)?;
        if let Some(watcher) = watcher {
            Self::register(&mut self.data_watches, path, session, watcher);
        }
        Ok(self.nodes.get(path).map(|node| node.stat.clone()))
    }

    fn get_data(
        &mut self,
        session: SessionId,
        path: &str,
        watcher: Option<Arc<dyn Watcher>>,
    ) -> Result<(Vec<u8>, Stat)> {
        self.check_session(session)?;
        Self::check_path(path)?;
        let node = self
            .nodes
            .get(path)
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))?;
        let result = (node.data.clone(), node.stat.clone());
        if let Some(watcher) = watcher {
            Self::register(&mut self.data_watches, path, session, watcher);
        }
        Ok(result)
    }

    fn get_children(
        &mut self,
        session: SessionId,
        path: &str,
        watcher: Option<Arc<dyn Watcher>>,
    ) -> Result<Vec<String>> {
        self.check_session(session)?;
        Self::check_path(path)?;
        let node = self
            .nodes
            .get(path)
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))?;
        let children = node.children.iter().cloned().collect();
        if let Some(watcher) = watcher {
            Self::register(&mut self.child_watches, path, session, watcher);
        }
        Ok(children)
    }

    fn set_data(
        &mut self,
        session: SessionId,
        path: &str,
        data: &[u8],
        version: i32,
    ) -> Result<Stat> {
        self.check_session(session)?;
        Self::check_path(path)?;
        let zxid = self.zxid + 1;
        let node = self
            .nodes
            .get_mut(path)
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))?;
        if version != ANY_VERSION && version != node.stat.version {
            return Err(CoordinationError::BadVersion {
                path: path.to_string(),
                expected: version,
                actual: node.stat.version,
            });
        }

        node.data = data.to_vec();
        node.stat.version += 1;
        node.stat.mzxid = zxid;
        node.stat.data_length = data.len();
        let stat = node.stat.clone();
        self.zxid = zxid;

        self.fire_data(path, EventType::NodeDataChanged);
        Ok(stat)
    }

    /// A watcher registered twice on the same path by the same session fires once.
    fn register(
        watches: &mut HashMap<String, Vec<Registration>>,
        path: &str,
        session: SessionId,
        watcher: Arc<dyn Watcher>,
    ) {
        let registrations = watches.entry(path.to_string()).or_default();
        let duplicate = registrations
            .iter()
            .any(|r| r.session == session && Arc::ptr_eq(&r.watcher, &watcher));
        if !duplicate {
            registrations.push(Registration { session, watcher });
        }
    }

    fn remove_data_watch(
        &mut self,
        session: SessionId,
        path: &str,
        watcher: &Arc<dyn Watcher>,
    ) -> Result<bool> {
        self.check_session(session)?;
        Self::check_path(path)?;
        let Some(registrations) = self.data_watches.get_mut(path) else {
            return Ok(false);
        };
        let before = registrations.len();
        registrations.retain(|r| !(r.session == session && Arc::ptr_eq(&r.watcher, watcher)));
        let removed = registrations.len() < before;
        if registrations.is_empty() {
            self.data_watches.remove(path);
        }
        Ok(removed)
    }

    fn fire_data(&mut self, path: &str, event_type: EventType) {
        if let Some(registrations) = self.data_watches.remove(path) {
            self.deliver(registrations, WatchedEvent::node(event_type, path));
        }
    }

    fn fire_children(&mut self, path: &str, event_type: EventType) {
        if let Some(registrations) = self.child_watches.remove(path) {
            self.deliver(registrations, WatchedEvent::node(event_type, path));
        }
    }

    fn deliver(&self, registrations: Vec<Registration>, event: WatchedEvent) {
        for registration in registrations {
            if let Some(entry) = self.sessions.get(&registration.session) {
                let _ = entry.sender.send(Delivery {
                    watcher: registration.watcher,
                    event: event.clone(),
                });
            }
        }
    }

    fn end_session(&mut self, session: SessionId, state: KeeperState) -> bool {
        let Some(entry) = self.sessions.remove(&session) else {
            return false;
        };

        for path in &entry.ephemerals {
            self.remove_node(path);
        }
        for watches in [&mut self.data_watches, &mut self.child_watches] {
            watches.retain(|_, registrations| {
                registrations.retain(|r| r.session != session);
                !registrations.is_empty()
            });
        }

        let _ = entry.sender.send(Delivery {
            watcher: entry.default_watcher.clone(),
            event: WatchedEvent::session(state),
        });

        info!(
            "Session ended: session={}, state={:?}, ephemerals_removed={}",
            session,
            state,
            entry.ephemerals.len()
        );
        true
    }
}

/// Shared in-process node tree.
///
/// Cloning yields another handle to the same tree.
#[derive(Clone)]
pub struct MemoryEnsemble {
    state: Arc<Mutex<EnsembleState>>,
}

impl MemoryEnsemble {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(EnsembleState::new())),
        }
    }

    /// Open a session. `default_watcher` receives connection-state events.
    ///
    /// Returns the session client and the dispatcher that must be driven to
    /// deliver the session's fired watches.
    pub fn connect(
        &self,
        default_watcher: Arc<dyn Watcher>,
    ) -> (Arc<MemorySession>, EventDispatcher) {
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut state = self.state.lock();
        state.last_session += 1;
        let id = state.last_session;

        let _ = sender.send(Delivery {
            watcher: default_watcher.clone(),
            event: WatchedEvent::session(KeeperState::SyncConnected),
        });
        state.sessions.insert(
            id,
            SessionEntry {
                sender,
                default_watcher,
                ephemerals: BTreeSet::new(),
            },
        );
        drop(state);

        debug!("Session opened: session={}", id);

        let session = Arc::new(MemorySession {
            id,
            state: Arc::downgrade(&self.state),
        });
        (session, EventDispatcher::new(id, receiver))
    }

    /// Expire a session as if its owner stopped heartbeating.
    ///
    /// Returns `false` when the session had already ended.
    pub fn expire(&self, session: SessionId) -> bool {
        self.state.lock().end_session(session, KeeperState::Expired)
    }

    /// Sorted child names of a node, empty when the node is absent.
    pub fn children_of(&self, path: &str) -> Vec<String> {
        self.state
            .lock()
            .nodes
            .get(path)
            .map(|node| node.children.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.state.lock().nodes.contains_key(path)
    }

    /// Payload of a node.
    pub fn data_of(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().nodes.get(path).map(|n| n.data.clone())
    }

    /// Owning session of an ephemeral node.
    pub fn owner_of(&self, path: &str) -> Option<SessionId> {
        self.state
            .lock()
            .nodes
            .get(path)
            .map(|n| n.stat.ephemeral_owner)
            .filter(|owner| *owner != 0)
    }

    /// Sessions holding a pending data watch on `path`.
    pub fn data_watchers(&self, path: &str) -> Vec<SessionId> {
        self.state
            .lock()
            .data_watches
            .get(path)
            .map(|regs| regs.iter().map(|r| r.session).collect())
            .unwrap_or_default()
    }

    /// Paths on which `session` holds a pending data watch, sorted.
    pub fn data_watches_of(&self, session: SessionId) -> Vec<String> {
        let state = self.state.lock();
        let mut paths: Vec<String> = state
            .data_watches
            .iter()
            .filter(|(_, regs)| regs.iter().any(|r| r.session == session))
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths
    }

    /// Sessions holding a pending child watch on `path`.
    pub fn child_watchers(&self, path: &str) -> Vec<SessionId> {
        self.state
            .lock()
            .child_watches
            .get(path)
            .map(|regs| regs.iter().map(|r| r.session).collect())
            .unwrap_or_default()
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }
}

impl Default for MemoryEnsemble {
    fn default() -> Self {
        Self::new()
    }
}

/// A session on a [`MemoryEnsemble`].
///
/// Holds the tree weakly: pending watches keep their watchers alive, and
/// those watchers commonly own the session, so a strong handle here would
/// keep the whole ensemble alive forever.
pub struct MemorySession {
    id: SessionId,
    state: Weak<Mutex<EnsembleState>>,
}

impl MemorySession {
    fn state(&self) -> Result<Arc<Mutex<EnsembleState>>> {
        self.state.upgrade().ok_or(CoordinationError::ConnectionLoss)
    }

    /// Close the session, removing its ephemeral nodes.
    pub fn close(&self) -> bool {
        self.state
            .upgrade()
            .is_some_and(|state| state.lock().end_session(self.id, KeeperState::Closed))
    }

    /// The ensemble this session belongs to, if it is still alive.
    pub fn ensemble(&self) -> Option<MemoryEnsemble> {
        self.state.upgrade().map(|state| MemoryEnsemble { state })
    }
}

#[async_trait]
impl CoordinationClient for MemorySession {
    fn session_id(&self) -> u64 {
        self.id
    }

    async fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> Result<String> {
        self.state()?.lock().create(self.id, path, data, mode)
    }

    async fn delete(&self, path: &str, version: i32) -> Result<()> {
        self.state()?.lock().delete(self.id, path, version)
    }

    async fn exists(&self, path: &str, watcher: Option<Arc<dyn Watcher>>) -> Result<Option<Stat>> {
        self.state()?.lock().exists(self.id, path, watcher)
    }

    async fn get_children(
        &self,
        path: &str,
        watcher: Option<Arc<dyn Watcher>>,
    ) -> Result<Vec<String>> {
        self.state()?.lock().get_children(self.id, path, watcher)
    }

    async fn get_data(
        &self,
        path: &str,
        watcher: Option<Arc<dyn Watcher>>,
    ) -> Result<(Vec<u8>, Stat)> {
        self.state()?.lock().get_data(self.id, path, watcher)
    }

    async fn set_data(&self, path: &str, data: &[u8], version: i32) -> Result<Stat> {
        self.state()?.lock().set_data(self.id, path, data, version)
    }

    async fn remove_data_watch(&self, path: &str, watcher: &Arc<dyn Watcher>) -> Result<bool> {
        self.state()?
            .lock()
            .remove_data_watch(self.id, path, watcher)
    }
}
