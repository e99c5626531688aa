//! Succession Coordination - the hierarchical store seam
//!
//! This crate provides:
//! - `CoordinationClient`: session-scoped create/delete/exists/getChildren/getData
//! - `Watcher`: one-shot watch receiver
//! - `EventDispatcher`: sequential, in-order delivery of fired watches
//! - `MemoryEnsemble`: an in-process store implementing the client contract

pub mod client;
pub mod dispatch;
pub mod memory;
pub mod model;

pub use client::{CoordinationClient, FnWatcher, Watcher, ensure_persistent};
pub use dispatch::{Delivery, EventDispatcher};
pub use memory::{MemoryEnsemble, MemorySession, SessionId};
pub use model::{CreateMode, EventType, KeeperState, Stat, WatchedEvent};
