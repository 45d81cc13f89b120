//! Event system for catalog operations
//!
//! Provides an event bus for notifying listeners about catalog mutations.
//! Useful for:
//! - Audit logging
//! - Cache invalidation on the rendering side
//! - Surfacing sync inconsistencies without failing the triggering mutation

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// Catalog events emitted by the service layer
#[derive(Debug, Clone)]
pub enum CatalogEvent {
    // Taxonomy events
    RootCreated {
        id: String,
        name: String,
    },
    RootRenamed {
        id: String,
        name: String,
    },
    RootDeleted {
        id: String,
        businesses_cleared: u64,
    },
    SubcategoryAdded {
        root_id: String,
        id: String,
        name: String,
    },
    SubcategoryRenamed {
        root_id: String,
        id: String,
        name: String,
    },
    SubcategoryDeleted {
        root_id: String,
        id: String,
        businesses_cleared: u64,
    },
    Reordered {
        root_id: String,
        sub_id: Option<String>,
        count: usize,
    },
    ImageSet {
        root_id: String,
        sub_id: Option<String>,
        leaf_id: Option<String>,
    },

    // Business events
    BusinessCreated {
        id: String,
        name: String,
    },
    BusinessUpdated {
        id: String,
    },
    BusinessRecategorized {
        id: String,
        root_id: Option<String>,
        sub_id: Option<String>,
    },
    BusinessDeleted {
        id: String,
    },

    // Sync events
    /// A compensating write failed after its triggering mutation succeeded.
    /// Warning-level by contract: the mutation is still reported as a
    /// success, and the next reconcile run repairs the drift.
    SyncInconsistency {
        business_id: Option<String>,
        root_id: String,
        sub_id: Option<String>,
        reason: String,
    },
    Reconciled {
        root_id: String,
        added: usize,
        removed: usize,
        refreshed: usize,
        orphaned: usize,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    /// Handle an event
    fn on_event(&self, event: &CatalogEvent);
}

/// Event bus for broadcasting catalog events
pub struct EventBus {
    sender: broadcast::Sender<CatalogEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new event bus with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: CatalogEvent) {
        trace!(event = ?event, "Emitting catalog event");
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &CatalogEvent) {
        match event {
            CatalogEvent::RootCreated { id, name } => {
                debug!(id = %id, name = %name, "Root category created");
            }
            CatalogEvent::RootDeleted {
                id,
                businesses_cleared,
            } => {
                debug!(id = %id, cleared = businesses_cleared, "Root category deleted");
            }
            CatalogEvent::BusinessCreated { id, name } => {
                debug!(id = %id, name = %name, "Business created");
            }
            CatalogEvent::BusinessDeleted { id } => {
                debug!(id = %id, "Business deleted");
            }
            CatalogEvent::SyncInconsistency {
                business_id,
                root_id,
                sub_id,
                reason,
            } => {
                warn!(
                    business = ?business_id,
                    root = %root_id,
                    sub = ?sub_id,
                    reason = %reason,
                    "Sync inconsistency recorded"
                );
            }
            CatalogEvent::Reconciled {
                root_id,
                added,
                removed,
                refreshed,
                orphaned,
            } => {
                debug!(
                    root = %root_id,
                    added,
                    removed,
                    refreshed,
                    orphaned,
                    "Reconciled root category"
                );
            }
            _ => {
                trace!(event = ?event, "Catalog event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
