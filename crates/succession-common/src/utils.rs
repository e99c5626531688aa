//! Utility functions for Succession
//!
//! Path handling for the hierarchical node namespace, sequence-suffix parsing,
//! and local address discovery.

use std::sync::LazyLock;

use if_addrs::IfAddr;

use crate::SEQUENCE_DIGITS;

/// Absolute path: "/" or one or more "/segment" parts with no empty segment.
static PATH_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new("^(/|(/[^/\u{0}]+)+)$").expect("Invalid regex pattern"));

/// Validate a node path
///
/// # Examples
///
/// ```
/// use succession_common::is_valid_path;
///
/// assert!(is_valid_path("/election"));
/// assert!(is_valid_path("/service_registry/n_0000000001"));
/// assert!(!is_valid_path("election"));
/// assert!(!is_valid_path("/election/"));
/// ```
pub fn is_valid_path(path: &str) -> bool {
    PATH_PATTERN.is_match(path)
}

/// Parent of a path, `None` for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of a path.
pub fn node_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Join a parent path and a child name.
pub fn join_path(parent: &str, child: &str) -> String {
    if parent == "/" {
        format!("/{}", child)
    } else {
        format!("{}/{}", parent, child)
    }
}

/// Sequence number carried by a sequential node name.
///
/// # Examples
///
/// ```
/// use succession_common::sequence_of;
///
/// assert_eq!(sequence_of("c_0000000042"), Some(42));
/// assert_eq!(sequence_of("c_42"), None);
/// ```
pub fn sequence_of(name: &str) -> Option<u64> {
    let start = name.len().checked_sub(SEQUENCE_DIGITS)?;
    let suffix = name.get(start..)?;
    if !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Get the local IP address
///
/// Returns the first non-loopback IPv4 address found,
/// or "127.0.0.1" as fallback.
pub fn local_ip() -> String {
    if_addrs::get_if_addrs()
        .ok()
        .and_then(|addrs| {
            addrs
                .into_iter()
                .find(|iface| !iface.is_loopback() && matches!(iface.addr, IfAddr::V4(_)))
                .and_then(|iface| match iface.addr {
                    IfAddr::V4(addr) => Some(addr.ip.to_string()),
                    _ => None,
                })
        })
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

/// Host name of this machine, falling back to [`local_ip`].
pub fn local_host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(local_ip)
}

/// Address a worker publishes in the registry.
pub fn service_address(scheme: &str, host: &str, port: u16) -> String {
    format!("{}://{}:{}", scheme, host, port)
}
