//! Service registry
//!
//! Provides `ServiceRegistry` for publishing this instance's address and for
//! discovering every live address under the registry namespace.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use succession_common::{
    ANY_VERSION, CoordinationError, REGISTRY_NAMESPACE, REGISTRY_NODE_PREFIX, Result, join_path,
};
use succession_coordination::{
    CoordinationClient, CreateMode, EventType, WatchedEvent, Watcher, ensure_persistent,
};
use tracing::{debug, info, warn};

use crate::address_holder::{AddressView, AddressViewHolder};

/// Registry of live service addresses backed by ephemeral-sequential nodes.
pub struct ServiceRegistry {
    client: Arc<dyn CoordinationClient>,
    namespace: String,
    /// Path of this instance's entry while registered
    registration: Mutex<Option<String>>,
    address_holder: AddressViewHolder,
    /// Serializes rescans so the view has a single writer
    scan_lock: tokio::sync::Mutex<()>,
    me: Weak<ServiceRegistry>,
}

impl ServiceRegistry {
    /// Create a registry using the default registry namespace.
    pub fn new(client: Arc<dyn CoordinationClient>) -> Arc<Self> {
        Self::with_namespace(client, REGISTRY_NAMESPACE)
    }

    pub fn with_namespace(
        client: Arc<dyn CoordinationClient>,
        namespace: impl Into<String>,
    ) -> Arc<Self> {
        let namespace = namespace.into();
        Arc::new_cyclic(|me| Self {
            client,
            namespace,
            registration: Mutex::new(None),
            address_holder: AddressViewHolder::new(),
            scan_lock: tokio::sync::Mutex::new(()),
            me: me.clone(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Create the registry namespace if absent.
    ///
    /// Another process creating it first, even concurrently, is not an error.
    pub async fn ensure_registry_namespace(&self) -> Result<()> {
        if ensure_persistent(self.client.as_ref(), &self.namespace).await? {
            info!("Created registry namespace: {}", self.namespace);
        }
        Ok(())
    }

    /// Publish `address` as a new registry entry and remember its path.
    ///
    /// Calling this again without unregistering publishes a second entry.
    pub async fn register_to_cluster(&self, address: &str) -> Result<String> {
        let prefix = join_path(&self.namespace, REGISTRY_NODE_PREFIX);
        let path = self
            .client
            .create(&prefix, address.as_bytes(), CreateMode::EphemeralSequential)
            .await?;

        info!("Registered to cluster: address={}, node={}", address, path);
        *self.registration.lock() = Some(path.clone());
        Ok(path)
    }

    /// Remove this instance's entry.
    ///
    /// Returns `false` when there was nothing to remove, including when the
    /// entry already disappeared with the session.
    pub async fn unregister_from_cluster(&self) -> Result<bool> {
        let Some(path) = self.registration() else {
            return Ok(false);
        };

        let removed = match self.client.delete(&path, ANY_VERSION).await {
            Ok(()) => true,
            Err(e) if e.is_no_node() => {
                debug!("Registry entry already gone: node={}", path);
                false
            }
            Err(e) => return Err(e),
        };

        *self.registration.lock() = None;
        if removed {
            info!("Unregistered from cluster: node={}", path);
        }
        Ok(removed)
    }

    /// Path of this instance's entry, if registered.
    pub fn registration(&self) -> Option<String> {
        self.registration.lock().clone()
    }

    pub fn is_registered(&self) -> bool {
        self.registration.lock().is_some()
    }

    /// Current address view.
    ///
    /// The first call scans the registry and arms the change watch; later
    /// calls return the cached view kept fresh by that watch.
    pub async fn get_all_service_addresses(&self) -> Result<Arc<AddressView>> {
        if let Some(view) = self.address_holder.get() {
            return Ok(view);
        }

        let _guard = self.scan_lock.lock().await;
        if let Some(view) = self.address_holder.get() {
            return Ok(view);
        }
        self.scan().await
    }

    /// Scan now and keep watching the registry for membership changes.
    pub async fn register_updates(&self) -> Result<Arc<AddressView>> {
        self.rescan().await
    }

    async fn rescan(&self) -> Result<Arc<AddressView>> {
        let _guard = self.scan_lock.lock().await;
        self.scan().await
    }

    /// List with a fresh children watch, then read each entry. Entries that
    /// vanish between the listing and their read are skipped.
    async fn scan(&self) -> Result<Arc<AddressView>> {
        let children = self
            .client
            .get_children(&self.namespace, Some(self.watcher()?))
            .await?;

        let mut addresses = Vec::with_capacity(children.len());
        for child in &children {
            let path = join_path(&self.namespace, child);
            if self.client.exists(&path, None).await?.is_none() {
                debug!("Registry entry vanished before read: node={}", path);
                continue;
            }
            match self.client.get_data(&path, None).await {
                Ok((data, _)) => addresses.push(String::from_utf8_lossy(&data).into_owned()),
                Err(e) if e.is_no_node() => {
                    debug!("Registry entry vanished during read: node={}", path);
                }
                Err(e) => return Err(e),
            }
        }

        let view = self.address_holder.update(addresses);
        counter!("succession_registry_rescans_total").increment(1);
        gauge!("succession_registry_addresses").set(view.len() as f64);
        debug!(
            "Registry rescanned: version={}, addresses={:?}",
            view.version(),
            view.addresses()
        );
        Ok(view)
    }

    fn watcher(&self) -> Result<Arc<dyn Watcher>> {
        let me = self.me.upgrade().ok_or_else(|| {
            CoordinationError::IllegalState("registry dropped while scanning".to_string())
        })?;
        Ok(me)
    }
}

#[async_trait]
impl Watcher for ServiceRegistry {
    async fn process(&self, event: WatchedEvent) -> Result<()> {
        match event.event_type {
            EventType::NodeChildrenChanged => {
                self.rescan().await?;
            }
            EventType::NodeDeleted => {
                warn!(
                    "Registry namespace deleted, no longer watching: {}",
                    self.namespace
                );
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use succession_coordination::{
        EventDispatcher, FnWatcher, MemoryEnsemble, MemorySession, SessionId, Stat,
    };

    struct Member {
        session: Arc<MemorySession>,
        dispatcher: EventDispatcher,
        registry: Arc<ServiceRegistry>,
    }

    async fn member(ensemble: &MemoryEnsemble) -> Member {
        let (session, dispatcher) = ensemble.connect(Arc::new(FnWatcher::new(|_| {})));
        let registry = ServiceRegistry::new(session.clone());
        registry.ensure_registry_namespace().await.unwrap();
        Member {
            session,
            dispatcher,
            registry,
        }
    }

    fn sorted(view: &AddressView) -> Vec<String> {
        let mut addresses = view.addresses().to_vec();
        addresses.sort();
        addresses
    }

    #[tokio::test]
    async fn test_namespace_creation_is_idempotent() {
        let ensemble = MemoryEnsemble::new();
        let a = member(&ensemble).await;
        let b = member(&ensemble).await;

        a.registry.ensure_registry_namespace().await.unwrap();
        b.registry.ensure_registry_namespace().await.unwrap();
        assert_eq!(ensemble.children_of("/"), vec!["service_registry"]);
    }

    #[tokio::test]
    async fn test_register_and_unregister() {
        let ensemble = MemoryEnsemble::new();
        let m = member(&ensemble).await;

        // Not registered yet: no-op
        assert!(!m.registry.unregister_from_cluster().await.unwrap());

        let path = m
            .registry
            .register_to_cluster("http://10.0.0.1:8080")
            .await
            .unwrap();
        assert!(m.registry.is_registered());
        assert_eq!(
            ensemble.data_of(&path),
            Some(b"http://10.0.0.1:8080".to_vec())
        );

        assert!(m.registry.unregister_from_cluster().await.unwrap());
        assert!(!m.registry.is_registered());
        assert!(!ensemble.contains(&path));
        assert!(!m.registry.unregister_from_cluster().await.unwrap());
    }

    #[tokio::test]
    async fn test_unregister_tolerates_entry_already_gone() {
        let ensemble = MemoryEnsemble::new();
        let m = member(&ensemble).await;
        let other = member(&ensemble).await;

        let path = m.registry.register_to_cluster("10.0.0.1:8080").await.unwrap();
        other.session.delete(&path, ANY_VERSION).await.unwrap();

        assert!(!m.registry.unregister_from_cluster().await.unwrap());
        assert!(m.registry.registration().is_none());
    }

    #[tokio::test]
    async fn test_double_registration_yields_two_entries() {
        let ensemble = MemoryEnsemble::new();
        let m = member(&ensemble).await;

        let first = m.registry.register_to_cluster("10.0.0.1:8080").await.unwrap();
        let second = m.registry.register_to_cluster("10.0.0.1:8080").await.unwrap();
        assert_ne!(first, second);
        assert_eq!(m.registry.registration(), Some(second));

        let view = m.registry.get_all_service_addresses().await.unwrap();
        assert_eq!(view.addresses(), ["10.0.0.1:8080", "10.0.0.1:8080"]);
    }

    #[tokio::test]
    async fn test_first_read_scans_and_arms_watch() {
        let ensemble = MemoryEnsemble::new();
        let m = member(&ensemble).await;

        assert!(ensemble.child_watchers(REGISTRY_NAMESPACE).is_empty());
        let view = m.registry.get_all_service_addresses().await.unwrap();
        assert!(view.is_empty());
        assert_eq!(view.version(), 1);
        assert_eq!(
            ensemble.child_watchers(REGISTRY_NAMESPACE),
            vec![m.session.session_id()]
        );

        // Cached afterwards
        let again = m.registry.get_all_service_addresses().await.unwrap();
        assert!(Arc::ptr_eq(&view, &again));
    }

    #[tokio::test]
    async fn test_watch_fire_picks_up_new_worker() {
        let ensemble = MemoryEnsemble::new();
        let mut leader = member(&ensemble).await;
        let w1 = member(&ensemble).await;
        let w2 = member(&ensemble).await;
        let w3 = member(&ensemble).await;

        w1.registry.register_to_cluster("10.0.0.1:8080").await.unwrap();
        w2.registry.register_to_cluster("10.0.0.2:8080").await.unwrap();

        let view = leader.registry.register_updates().await.unwrap();
        assert_eq!(sorted(&view), vec!["10.0.0.1:8080", "10.0.0.2:8080"]);

        w3.registry.register_to_cluster("10.0.0.3:8080").await.unwrap();
        assert_eq!(leader.dispatcher.dispatch_pending().await, 2);

        let view = leader.registry.get_all_service_addresses().await.unwrap();
        assert_eq!(
            sorted(&view),
            vec!["10.0.0.1:8080", "10.0.0.2:8080", "10.0.0.3:8080"]
        );
        // Watch re-armed by the rescan
        assert_eq!(
            ensemble.child_watchers(REGISTRY_NAMESPACE),
            vec![leader.session.session_id()]
        );
    }

    #[tokio::test]
    async fn test_expired_worker_disappears_from_view() {
        let ensemble = MemoryEnsemble::new();
        let mut leader = member(&ensemble).await;
        let w1 = member(&ensemble).await;
        let w2 = member(&ensemble).await;

        w1.registry.register_to_cluster("10.0.0.1:8080").await.unwrap();
        w2.registry.register_to_cluster("10.0.0.2:8080").await.unwrap();
        let before = leader.registry.register_updates().await.unwrap();

        assert!(ensemble.expire(w1.session.session_id()));
        leader.dispatcher.dispatch_pending().await;

        let after = leader.registry.get_all_service_addresses().await.unwrap();
        assert_eq!(after.addresses(), ["10.0.0.2:8080"]);
        assert!(after.version() > before.version());
        // The earlier snapshot is untouched
        assert_eq!(before.len(), 2);
    }

    /// Client that removes victim sessions right before each entry read,
    /// reproducing entries that die between listing and reading.
    struct VanishingClient {
        inner: Arc<MemorySession>,
        victims: Mutex<Vec<SessionId>>,
    }

    #[async_trait]
    impl CoordinationClient for VanishingClient {
        fn session_id(&self) -> u64 {
            self.inner.session_id()
        }

        async fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> Result<String> {
            self.inner.create(path, data, mode).await
        }

        async fn delete(&self, path: &str, version: i32) -> Result<()> {
            self.inner.delete(path, version).await
        }

        async fn exists(
            &self,
            path: &str,
            watcher: Option<Arc<dyn Watcher>>,
        ) -> Result<Option<Stat>> {
            self.inner.exists(path, watcher).await
        }

        async fn get_children(
            &self,
            path: &str,
            watcher: Option<Arc<dyn Watcher>>,
        ) -> Result<Vec<String>> {
            let children = self.inner.get_children(path, watcher).await?;
            let victims: Vec<SessionId> = self.victims.lock().drain(..).collect();
            if let Some(ensemble) = self.inner.ensemble() {
                for victim in victims {
                    ensemble.expire(victim);
                }
            }
            Ok(children)
        }

        async fn get_data(
            &self,
            path: &str,
            watcher: Option<Arc<dyn Watcher>>,
        ) -> Result<(Vec<u8>, Stat)> {
            self.inner.get_data(path, watcher).await
        }

        async fn set_data(&self, path: &str, data: &[u8], version: i32) -> Result<Stat> {
            self.inner.set_data(path, data, version).await
        }

        async fn remove_data_watch(&self, path: &str, watcher: &Arc<dyn Watcher>) -> Result<bool> {
            self.inner.remove_data_watch(path, watcher).await
        }
    }

    #[tokio::test]
    async fn test_entries_vanishing_mid_scan_are_skipped() {
        let ensemble = MemoryEnsemble::new();
        let w1 = member(&ensemble).await;
        let w2 = member(&ensemble).await;
        w1.registry.register_to_cluster("10.0.0.1:8080").await.unwrap();
        w2.registry.register_to_cluster("10.0.0.2:8080").await.unwrap();

        let (session, _dispatcher) = ensemble.connect(Arc::new(FnWatcher::new(|_| {})));
        let client = Arc::new(VanishingClient {
            inner: session,
            victims: Mutex::new(vec![w1.session.session_id()]),
        });
        let registry = ServiceRegistry::new(client);

        let view = registry.register_updates().await.unwrap();
        assert_eq!(view.addresses(), ["10.0.0.2:8080"]);
    }

    #[tokio::test]
    async fn test_missing_namespace_propagates() {
        let ensemble = MemoryEnsemble::new();
        let (session, _dispatcher) = ensemble.connect(Arc::new(FnWatcher::new(|_| {})));
        let registry = ServiceRegistry::with_namespace(session, "/absent");

        let err = registry.get_all_service_addresses().await.unwrap_err();
        assert!(err.is_no_node());
        assert!(registry.register_to_cluster("x").await.unwrap_err().is_no_node());
    }
}
