//! # Inventory Ledger
//!
//! Append-only stock movements plus the materialized `stock_quantity`
//! counter, kept in lockstep inside one transaction per adjustment.
//!
//! ## The Guarded Delta Update
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  adjust(product, -3)                                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                  │
//! │       │                                                                 │
//! │       ▼  (first statement in the transaction is a WRITE)                │
//! │  UPDATE products                                                        │
//! │     SET stock_quantity = stock_quantity + (-3)                          │
//! │   WHERE id = ?                                                          │
//! │     AND (stock_quantity + (-3) >= 0 OR backorder_allowed = 1)           │
//! │       │                                                                 │
//! │       ├── rows_affected = 0 ──► ROLLBACK, InsufficientStock / NotFound  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SELECT new level ──► INSERT movement ──► COMMIT ──► emit signals       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The UPDATE is the first statement so the transaction takes the WAL
//! write lock immediately and the guard evaluates against the latest
//! committed counter. Two checkouts racing for the last unit serialize on
//! that lock; the loser's guard sees the decremented counter and matches
//! zero rows. Nothing is written on the failure path.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use storefront_core::{
    CoreError, InventoryMovement, MovementType, Notifier, Signal,
};

use crate::error::{DbError, DbResult};

/// One requested ledger adjustment.
#[derive(Debug, Clone)]
pub struct Adjustment {
    pub product_id: String,
    /// Signed: negative removes stock, positive adds it.
    pub quantity_change: i64,
    pub movement_type: MovementType,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
}

/// What an applied adjustment produced: the appended movement, the new
/// counter value, and the signals to emit once the surrounding
/// transaction commits.
#[derive(Debug)]
pub struct AdjustmentOutcome {
    pub movement: InventoryMovement,
    pub new_level: i64,
    pub signals: Vec<Signal>,
}

/// A committed ledger adjustment: the movement record plus the counter
/// value it left behind.
#[derive(Debug, Clone)]
pub struct StockChange {
    pub movement: InventoryMovement,
    pub new_level: i64,
}

/// Applies one adjustment on an open connection/transaction. Used by
/// [`InventoryLedger::adjust`] for standalone adjustments and by the
/// checkout orchestrator inside the order transaction.
///
/// Signals in the outcome are NOT emitted here; the caller emits them
/// after its commit succeeds.
pub(crate) async fn apply_adjustment(
    conn: &mut SqliteConnection,
    adj: &Adjustment,
) -> DbResult<AdjustmentOutcome> {
    if adj.quantity_change == 0 {
        return Err(DbError::Domain(CoreError::InvalidAdjustment(
            "quantity_change must be non-zero".to_string(),
        )));
    }

    let now = Utc::now();

    // Guarded delta update. The guard re-evaluates under the write lock,
    // which is what makes concurrent overdraw impossible.
    let result = sqlx::query(
        r#"
        UPDATE products
           SET stock_quantity = stock_quantity + ?,
               updated_at = ?
         WHERE id = ?
           AND (stock_quantity + ? >= 0 OR backorder_allowed = 1)
        "#,
    )
    .bind(adj.quantity_change)
    .bind(now)
    .bind(&adj.product_id)
    .bind(adj.quantity_change)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        // Distinguish "no such product" from "guard refused".
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT stock_quantity FROM products WHERE id = ?")
                .bind(&adj.product_id)
                .fetch_optional(&mut *conn)
                .await?;
        return match row {
            None => Err(DbError::Domain(CoreError::ProductNotFound(
                adj.product_id.clone(),
            ))),
            Some((available,)) => {
                warn!(
                    product_id = %adj.product_id,
                    available,
                    requested = -adj.quantity_change,
                    "Insufficient stock"
                );
                Err(DbError::Domain(CoreError::InsufficientStock {
                    product_id: adj.product_id.clone(),
                    available,
                    requested: -adj.quantity_change,
                }))
            }
        };
    }

    let (new_level, threshold, sku): (i64, i64, String) = sqlx::query_as(
        "SELECT stock_quantity, low_stock_threshold, sku FROM products WHERE id = ?",
    )
    .bind(&adj.product_id)
    .fetch_one(&mut *conn)
    .await?;

    let movement = InventoryMovement {
        id: Uuid::new_v4().to_string(),
        product_id: adj.product_id.clone(),
        quantity_change: adj.quantity_change,
        movement_type: adj.movement_type,
        reference_id: adj.reference_id.clone(),
        notes: adj.notes.clone(),
        created_at: now,
    };
    sqlx::query(
        r#"
        INSERT INTO inventory_movements (
            id, product_id, quantity_change, movement_type,
            reference_id, notes, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.product_id)
    .bind(movement.quantity_change)
    .bind(movement.movement_type)
    .bind(&movement.reference_id)
    .bind(&movement.notes)
    .bind(movement.created_at)
    .execute(&mut *conn)
    .await?;

    let mut signals = vec![Signal::StockChanged {
        product_id: adj.product_id.clone(),
        quantity_change: adj.quantity_change,
        new_level,
        movement_type: adj.movement_type,
        reference_id: adj.reference_id.clone(),
    }];
    if adj.quantity_change < 0 && new_level <= threshold {
        signals.push(Signal::LowStockReached {
            product_id: adj.product_id.clone(),
            sku,
            stock_quantity: new_level,
            low_stock_threshold: threshold,
        });
    }

    debug!(
        product_id = %adj.product_id,
        change = adj.quantity_change,
        new_level,
        "Stock adjusted"
    );
    Ok(AdjustmentOutcome {
        movement,
        new_level,
        signals,
    })
}

/// The inventory ledger: every stock change goes through here (or through
/// checkout, which borrows [`apply_adjustment`] on its own transaction).
#[derive(Clone)]
pub struct InventoryLedger {
    pool: SqlitePool,
    notifier: Arc<dyn Notifier>,
}

impl InventoryLedger {
    pub fn new(pool: SqlitePool, notifier: Arc<dyn Notifier>) -> Self {
        InventoryLedger { pool, notifier }
    }

    /// Applies one adjustment atomically and returns the appended
    /// movement together with the new stock level.
    ///
    /// On `InsufficientStock` nothing is written, not even the movement
    /// row. Signals fire only after the commit.
    pub async fn adjust(&self, adj: Adjustment) -> DbResult<StockChange> {
        let mut tx = self.pool.begin().await?;
        let outcome = apply_adjustment(&mut tx, &adj).await?;
        tx.commit().await?;

        for signal in &outcome.signals {
            self.notifier.notify(signal);
        }
        Ok(StockChange {
            movement: outcome.movement,
            new_level: outcome.new_level,
        })
    }

    /// Records a sale: stock out, referenced to the order.
    pub async fn decrease_on_sale(
        &self,
        product_id: &str,
        quantity: i64,
        order_number: &str,
    ) -> DbResult<StockChange> {
        self.adjust(Adjustment {
            product_id: product_id.to_string(),
            quantity_change: -quantity,
            movement_type: MovementType::Sale,
            reference_id: Some(order_number.to_string()),
            notes: Some(format!("Order #{order_number}")),
        })
        .await
    }

    /// Records a return: stock back in, referenced to the order.
    pub async fn increase_on_return(
        &self,
        product_id: &str,
        quantity: i64,
        order_number: &str,
    ) -> DbResult<StockChange> {
        self.adjust(Adjustment {
            product_id: product_id.to_string(),
            quantity_change: quantity,
            movement_type: MovementType::Return,
            reference_id: Some(order_number.to_string()),
            notes: Some(format!("Return for Order #{order_number}")),
        })
        .await
    }

    /// Records a supplier delivery. Without a note the movement reads
    /// "Product restock".
    pub async fn restock(
        &self,
        product_id: &str,
        quantity: i64,
        notes: Option<String>,
    ) -> DbResult<StockChange> {
        self.adjust(Adjustment {
            product_id: product_id.to_string(),
            quantity_change: quantity,
            movement_type: MovementType::Restock,
            reference_id: None,
            notes: Some(notes.unwrap_or_else(|| "Product restock".to_string())),
        })
        .await
    }

    /// Advisory availability check, for carts and product pages. The
    /// authoritative answer is whatever [`InventoryLedger::adjust`] says
    /// at commit time.
    pub async fn is_available(&self, product_id: &str, quantity: i64) -> DbResult<bool> {
        if quantity <= 0 {
            return Ok(true);
        }
        let row: Option<(i64, bool)> = sqlx::query_as(
            "SELECT stock_quantity, backorder_allowed FROM products WHERE id = ?",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            None => Err(DbError::not_found("Product", product_id)),
            Some((stock, backorder)) => Ok(stock >= quantity || backorder),
        }
    }

    /// Current counter value.
    pub async fn stock_level(&self, product_id: &str) -> DbResult<i64> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT stock_quantity FROM products WHERE id = ?")
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(level,)| level)
            .ok_or_else(|| DbError::not_found("Product", product_id))
    }

    /// Movement history, newest first.
    pub async fn movements(&self, product_id: &str, limit: i64) -> DbResult<Vec<InventoryMovement>> {
        let movements = sqlx::query_as::<_, InventoryMovement>(
            r#"
            SELECT * FROM inventory_movements
             WHERE product_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?
            "#,
        )
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(movements)
    }

    /// Verifies the ledger-sum invariant: the materialized counter must
    /// equal the sum of all movements. A mismatch is a `ConsistencyFault`;
    /// something wrote the counter outside the ledger.
    pub async fn audit(&self, product_id: &str) -> DbResult<()> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT stock_quantity FROM products WHERE id = ?")
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await?;
        let counter = row
            .map(|(level,)| level)
            .ok_or_else(|| DbError::not_found("Product", product_id))?;

        let ledger_sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity_change), 0) FROM inventory_movements WHERE product_id = ?",
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        if counter != ledger_sum {
            return Err(DbError::Domain(CoreError::ConsistencyFault(format!(
                "product {product_id}: counter {counter} != ledger sum {ledger_sum}"
            ))));
        }
        info!(product_id = %product_id, counter, "Ledger audit passed");
        Ok(())
    }
}

impl std::fmt::Debug for InventoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryLedger").finish_non_exhaustive()
    }
}
