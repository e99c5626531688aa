//! Node and watch-event data model

/// How a node is created and how long it lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Survives the creating session
    Persistent,
    /// Persistent, with a monotonic counter appended to the name
    PersistentSequential,
    /// Removed when the creating session ends
    Ephemeral,
    /// Ephemeral, with a monotonic counter appended to the name
    EphemeralSequential,
}

impl CreateMode {
    pub fn is_ephemeral(self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    pub fn is_sequential(self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }
}

/// Node metadata returned by `exists`, `get_data` and `set_data`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stat {
    /// Transaction id of the create
    pub czxid: u64,
    /// Transaction id of the last data change
    pub mzxid: u64,
    /// Number of data changes
    pub version: i32,
    /// Number of child changes
    pub cversion: i32,
    /// Owning session of an ephemeral node, 0 otherwise
    pub ephemeral_owner: u64,
    pub data_length: usize,
    pub num_children: usize,
}

/// Kind of change a watch reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Connection-state change, no node involved
    None,
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
}

/// Session connection state carried by every event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeeperState {
    SyncConnected,
    Disconnected,
    Expired,
    Closed,
}

impl KeeperState {
    /// States after which the session will deliver nothing further.
    pub fn is_terminal(self) -> bool {
        !matches!(self, KeeperState::SyncConnected)
    }
}

/// A fired watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEvent {
    pub event_type: EventType,
    pub state: KeeperState,
    pub path: Option<String>,
}

impl WatchedEvent {
    /// Event about a node change on a connected session.
    pub fn node(event_type: EventType, path: impl Into<String>) -> Self {
        Self {
            event_type,
            state: KeeperState::SyncConnected,
            path: Some(path.into()),
        }
    }

    /// Connection-state event.
    pub fn session(state: KeeperState) -> Self {
        Self {
            event_type: EventType::None,
            state,
            path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mode_flags() {
        assert!(!CreateMode::Persistent.is_ephemeral());
        assert!(!CreateMode::Persistent.is_sequential());
        assert!(CreateMode::PersistentSequential.is_sequential());
        assert!(CreateMode::Ephemeral.is_ephemeral());
        assert!(CreateMode::EphemeralSequential.is_ephemeral());
        assert!(CreateMode::EphemeralSequential.is_sequential());
    }

    #[test]
    fn test_keeper_state_terminal() {
        assert!(!KeeperState::SyncConnected.is_terminal());
        assert!(KeeperState::Disconnected.is_terminal());
        assert!(KeeperState::Expired.is_terminal());
        assert!(KeeperState::Closed.is_terminal());
    }

    #[test]
    fn test_event_constructors() {
        let event = WatchedEvent::node(EventType::NodeDeleted, "/election/c_0000000001");
        assert_eq!(event.state, KeeperState::SyncConnected);
        assert_eq!(event.path.as_deref(), Some("/election/c_0000000001"));

        let event = WatchedEvent::session(KeeperState::Expired);
        assert_eq!(event.event_type, EventType::None);
        assert!(event.path.is_none());
    }
}
