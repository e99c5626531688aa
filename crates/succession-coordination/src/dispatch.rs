//! Sequential delivery of fired watches
//!
//! Each session owns one delivery queue. The dispatcher drains it on a single
//! task, awaiting every handler before taking the next event, so all state
//! transitions driven by watches happen one at a time and in emission order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::client::Watcher;
use crate::model::WatchedEvent;

/// A fired watch paired with the watcher it was registered for.
pub struct Delivery {
    pub watcher: Arc<dyn Watcher>,
    pub event: WatchedEvent,
}

/// Drains a session's delivery queue.
pub struct EventDispatcher {
    session_id: u64,
    receiver: mpsc::UnboundedReceiver<Delivery>,
}

impl EventDispatcher {
    pub fn new(session_id: u64, receiver: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self {
            session_id,
            receiver,
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Deliver events until the session's queue is closed.
    pub async fn run(mut self) {
        info!("Event dispatcher started: session={}", self.session_id);

        while let Some(delivery) = self.receiver.recv().await {
            self.deliver(delivery).await;
        }

        info!("Event dispatcher stopped: session={}", self.session_id);
    }

    /// Deliver everything already queued, including events queued by the
    /// handlers themselves, and return how many were delivered.
    pub async fn dispatch_pending(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(delivery) = self.receiver.try_recv() {
            self.deliver(delivery).await;
            delivered += 1;
        }
        delivered
    }

    async fn deliver(&self, delivery: Delivery) {
        debug!(
            "Dispatching event: session={}, event={:?}",
            self.session_id, delivery.event
        );

        if let Err(e) = delivery.watcher.process(delivery.event.clone()).await {
            error!(
                "Watcher failed: session={}, event={:?}, error={}",
                self.session_id, delivery.event, e
            );
        }
    }
}
