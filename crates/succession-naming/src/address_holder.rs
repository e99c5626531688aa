//! Address view holder for caching the discovered address list locally

use std::sync::Arc;

use parking_lot::RwLock;

/// Immutable snapshot of the live registry addresses.
///
/// Addresses keep the order the scan produced them in; callers should treat
/// the list as a set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressView {
    version: u64,
    addresses: Vec<String>,
}

impl AddressView {
    pub fn new(version: u64, addresses: Vec<String>) -> Self {
        Self { version, addresses }
    }

    /// Number of scans that produced views before and including this one.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn contains(&self, address: &str) -> bool {
        self.addresses.iter().any(|a| a == address)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Local cache of the latest [`AddressView`].
///
/// A single writer replaces the whole snapshot; readers clone the `Arc` and
/// never observe a partially built view.
pub struct AddressViewHolder {
    current: RwLock<Option<Arc<AddressView>>>,
}

impl AddressViewHolder {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    /// Latest snapshot, `None` until the first scan completes.
    pub fn get(&self) -> Option<Arc<AddressView>> {
        self.current.read().clone()
    }

    /// Publish a freshly scanned address list as the next version.
    pub fn update(&self, addresses: Vec<String>) -> Arc<AddressView> {
        let mut current = self.current.write();
        let version = current.as_ref().map_or(1, |view| view.version + 1);
        let view = Arc::new(AddressView::new(version, addresses));
        *current = Some(view.clone());
        view
    }
}

impl Default for AddressViewHolder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_view_holder() {
        let holder = AddressViewHolder::new();

        // Initially empty
        assert!(holder.get().is_none());

        let first = holder.update(vec!["http://10.0.0.1:8080".to_string()]);
        assert_eq!(first.version(), 1);
        assert!(first.contains("http://10.0.0.1:8080"));

        let second = holder.update(vec![
            "http://10.0.0.1:8080".to_string(),
            "http://10.0.0.2:8080".to_string(),
        ]);
        assert_eq!(second.version(), 2);
        assert_eq!(holder.get().unwrap().len(), 2);

        // Earlier snapshots are unaffected by later updates
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn test_empty_view() {
        let view = AddressView::default();
        assert!(view.is_empty());
        assert_eq!(view.version(), 0);
        assert!(!view.contains("anything"));
    }
}
