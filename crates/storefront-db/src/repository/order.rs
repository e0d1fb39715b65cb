//! # Order Repository
//!
//! Order persistence and lifecycle updates. Order creation happens inside
//! the checkout transaction via the `pub(crate)` insert helpers; this
//! repository covers everything after the commit: lookups and status
//! transitions.
//!
//! Status updates load the row, run the transition through the aggregate
//! (the only place that knows the state machine), and write back with an
//! optimistic `AND status = ?` guard so two concurrent updates cannot both
//! apply from the same starting state.

use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use chrono::Utc;
use storefront_core::{
    CoreError, Notifier, Order, OrderItem, OrderStatus, ShipmentInfo, Signal,
};

use crate::error::{DbError, DbResult};

/// Generates a business order number: `ORD-YYYYMMDD-XXXXXX` with a random
/// hex suffix. The UNIQUE index on `order_number` backstops the (tiny)
/// collision chance; callers treat `UniqueViolation` as retryable.
pub(crate) fn generate_order_number() -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix: String = Uuid::new_v4().simple().to_string()[..6].to_uppercase();
    format!("ORD-{date}-{suffix}")
}

/// Inserts the order row on an open connection/transaction.
pub(crate) async fn insert_order(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO orders (
            id, order_number, user_id, guest_email,
            shipping_name, shipping_line1, shipping_line2, shipping_city,
            shipping_state, shipping_postal_code, shipping_country,
            status, payment_status, payment_intent_id,
            subtotal_minor, discount_minor, shipping_minor, tax_minor,
            total_minor, currency_code,
            coupon_id, coupon_code_applied,
            paid_at, tracking_number, carrier,
            created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&order.id)
    .bind(&order.order_number)
    .bind(&order.user_id)
    .bind(&order.guest_email)
    .bind(&order.shipping_name)
    .bind(&order.shipping_line1)
    .bind(&order.shipping_line2)
    .bind(&order.shipping_city)
    .bind(&order.shipping_state)
    .bind(&order.shipping_postal_code)
    .bind(&order.shipping_country)
    .bind(order.status)
    .bind(order.payment_status)
    .bind(&order.payment_intent_id)
    .bind(order.subtotal_minor)
    .bind(order.discount_minor)
    .bind(order.shipping_minor)
    .bind(order.tax_minor)
    .bind(order.total_minor)
    .bind(&order.currency_code)
    .bind(&order.coupon_id)
    .bind(&order.coupon_code_applied)
    .bind(order.paid_at)
    .bind(&order.tracking_number)
    .bind(&order.carrier)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Inserts the order's line items on an open connection/transaction.
pub(crate) async fn insert_items(
    conn: &mut SqliteConnection,
    items: &[OrderItem],
) -> DbResult<()> {
    for item in items {
        sqlx::query(
            r#"
            INSERT INTO order_items (
                id, order_id, product_id, sku_snapshot, name_snapshot,
                quantity, unit_price_minor, total_price_minor, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&item.order_id)
        .bind(&item.product_id)
        .bind(&item.sku_snapshot)
        .bind(&item.name_snapshot)
        .bind(item.quantity)
        .bind(item.unit_price_minor)
        .bind(item.total_price_minor)
        .bind(item.created_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Repository for order lookups and lifecycle updates.
#[derive(Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
    notifier: Arc<dyn Notifier>,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool, notifier: Arc<dyn Notifier>) -> Self {
        OrderRepository { pool, notifier }
    }

    /// Fetches an order by UUID and verifies its financial invariant
    /// before handing it out.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Order> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Order", id))?;
        order.verify_totals().map_err(DbError::Domain)?;
        Ok(order)
    }

    /// Fetches an order by its business number.
    pub async fn get_by_number(&self, order_number: &str) -> DbResult<Order> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_number = ?")
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_number))?;
        order.verify_totals().map_err(DbError::Domain)?;
        Ok(order)
    }

    /// Line items for an order, in insertion order.
    pub async fn items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT * FROM order_items WHERE order_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        for item in &items {
            item.verify_total().map_err(DbError::Domain)?;
        }
        Ok(items)
    }

    /// Orders for a user, newest first.
    pub async fn list_for_user(&self, user_id: &str, limit: i64) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE user_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    /// Moves an order to `target` through the state machine. `shipment`
    /// is required for (and only read by) the transition into `Shipped`.
    ///
    /// Emits `OrderStatusChanged` after the commit.
    pub async fn update_status(
        &self,
        order_id: &str,
        target: OrderStatus,
        shipment: Option<ShipmentInfo>,
    ) -> DbResult<Order> {
        let mut tx = self.pool.begin().await?;

        let mut order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?")
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))?;

        let now = Utc::now();
        let old_status = order
            .transition(target, shipment, now)
            .map_err(DbError::Domain)?;

        let result = sqlx::query(
            r#"
            UPDATE orders
               SET status = ?,
                   payment_status = ?,
                   paid_at = ?,
                   tracking_number = ?,
                   carrier = ?,
                   updated_at = ?
             WHERE id = ?
               AND status = ?
            "#,
        )
        .bind(order.status)
        .bind(order.payment_status)
        .bind(order.paid_at)
        .bind(&order.tracking_number)
        .bind(&order.carrier)
        .bind(order.updated_at)
        .bind(&order.id)
        .bind(old_status)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Someone moved the order between our read and write.
            return Err(DbError::Domain(CoreError::InvalidTransition {
                from: old_status,
                to: target,
            }));
        }

        tx.commit().await?;

        self.notifier.notify(&Signal::OrderStatusChanged {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            old_status,
            new_status: order.status,
        });

        info!(
            order_number = %order.order_number,
            from = %old_status,
            to = %order.status,
            "Order status updated"
        );
        Ok(order)
    }
}

impl std::fmt::Debug for OrderRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderRepository").finish_non_exhaustive()
    }
}
