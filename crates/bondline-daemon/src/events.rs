//! Event broadcasting.
//!
//! Accounting events drained from the engine are pushed onto a broadcast
//! bus. Each subscriber has an independent buffer; a slow subscriber lags
//! and skips events rather than blocking the engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bondline_types::events::EventRecord;
use bondline_types::Address;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Filter for event subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// Category filter: "earnings", "bonding", "governance".
    pub categories: Option<Vec<String>>,
    /// Only events concerning one of these addresses.
    pub addresses: Option<Vec<Address>>,
}

/// Event bus for broadcasting events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventRecord>,
    emitted: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            emitted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, record: EventRecord) {
        self.emitted.fetch_add(1, Ordering::SeqCst);
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(record);
    }

    /// Subscribe to events. Returns a receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }

    /// Number of events emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::SeqCst)
    }
}

impl EventFilter {
    /// Check if an event matches this filter.
    pub fn matches(&self, record: &EventRecord) -> bool {
        if let Some(ref categories) = self.categories {
            let category = categorize_event(record.event.event_type());
            if !categories.iter().any(|c| c == category) {
                return false;
            }
        }

        if let Some(ref addresses) = self.addresses {
            let involved = record.event.addresses();
            if !involved.iter().any(|a| addresses.contains(a)) {
                return false;
            }
        }

        true
    }
}

/// Categorize an event type into a category.
fn categorize_event(event_type: &str) -> &'static str {
    match event_type {
        "reward" | "fees_recorded" | "earnings_claimed" => "earnings",
        "regime_boundary_set" | "snapshot_root_published" => "governance",
        _ => "bonding",
    }
}
