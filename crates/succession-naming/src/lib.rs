//! Succession Naming - service registration and discovery
//!
//! Workers publish their address as an ephemeral-sequential node under the
//! registry namespace; watchers keep an immutable, versioned view of every
//! live address, refreshed each time the namespace's children change.

pub mod address_holder;
pub mod registry;

pub use address_holder::{AddressView, AddressViewHolder};
pub use registry::ServiceRegistry;
