//! # Signals
//!
//! Fire-and-forget notifications emitted after a transaction commits.
//! Delivery failures are logged and swallowed; nothing transactional ever
//! depends on a signal reaching anyone.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::order::OrderStatus;
use crate::types::MovementType;

/// Everything the core announces to the outside world.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signal {
    /// A checkout transaction committed a new order.
    OrderPlaced {
        order_id: String,
        order_number: String,
        total_minor: i64,
        currency_code: String,
    },
    /// An order moved through its state machine.
    OrderStatusChanged {
        order_id: String,
        order_number: String,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    /// A ledger adjustment committed.
    StockChanged {
        product_id: String,
        quantity_change: i64,
        new_level: i64,
        movement_type: MovementType,
        reference_id: Option<String>,
    },
    /// A negative adjustment left the stock at or below its threshold.
    LowStockReached {
        product_id: String,
        sku: String,
        stock_quantity: i64,
        low_stock_threshold: i64,
    },
}

impl Signal {
    /// Stable dotted name, used as routing key and in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::OrderPlaced { .. } => "order.placed",
            Signal::OrderStatusChanged { .. } => "order.status_changed",
            Signal::StockChanged { .. } => "inventory.stock_changed",
            Signal::LowStockReached { .. } => "inventory.low_stock",
        }
    }
}

/// A sink for [`Signal`]s. Implementations must not block for long and
/// must not fail loudly; a lost signal is acceptable, a poisoned commit
/// path is not.
pub trait Notifier: Send + Sync {
    fn notify(&self, signal: &Signal);
}

/// Discards every signal. The default for tests and embedded use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _signal: &Signal) {}
}

/// Writes every signal to the tracing pipeline as a structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, signal: &Signal) {
        match serde_json::to_string(signal) {
            Ok(payload) => info!(kind = signal.kind(), %payload, "signal"),
            Err(_) => info!(kind = signal.kind(), "signal (unserializable)"),
        }
    }
}
