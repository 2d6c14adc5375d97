//! # Change Notifications
//!
//! In-process notification of committed ledger changes.
//!
//! ## Delivery
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  LedgerTx body                                                          │
//! │    tx.emit(SaleCommitted) ──► queued on the tx (not visible yet)        │
//! │    tx.emit(ProductStockChanged)                                         │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  COMMIT ok? ──no──► queue dropped, nothing is published                 │
//! │         │ yes                                                           │
//! │         ▼                                                               │
//! │  EventBus::publish ──► broadcast::Sender ──► every subscriber, FIFO     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Delivery is best-effort: with no subscribers events are dropped, and a
//! subscriber that falls more than `channel_capacity` events behind sees
//! `RecvError::Lagged`.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// One committed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// On-hand quantity of a product changed.
    ProductStockChanged { product_id: i64 },
    SaleCommitted { sale_id: i64 },
    SaleUpdated { sale_id: i64 },
    SaleVoided { sale_id: i64 },
    PurchaseCommitted { purchase_id: i64 },
    PurchaseUpdated { purchase_id: i64 },
    PurchaseDeleted { purchase_id: i64 },
}

/// Publisher side of the notification channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LedgerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        EventBus { sender }
    }

    /// New receiver that sees every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }

    /// Publishes events in order. Only called after a successful commit.
    pub fn publish(&self, events: Vec<LedgerEvent>) {
        for event in events {
            trace!(?event, "Publishing ledger event");
            // No receivers is not an error.
            let _ = self.sender.send(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
