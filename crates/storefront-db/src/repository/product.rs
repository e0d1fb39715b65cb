//! # Product Repository
//!
//! Catalog access: create, look up, deactivate. Stock mutations do NOT
//! live here; the inventory ledger is the only writer of
//! `products.stock_quantity`. The one exception is product creation,
//! which seeds the counter together with its `initial` movement in a
//! single transaction so the ledger-sum invariant holds from row one.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use storefront_core::validation::validate_sku;
use storefront_core::{MovementType, Product};

use crate::error::{DbError, DbResult};

/// Parameters for creating a product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub price_minor: i64,
    pub currency_code: String,
    pub initial_stock: i64,
    pub low_stock_threshold: i64,
    pub backorder_allowed: bool,
}

/// Repository for product catalog operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Creates a product and, when `initial_stock > 0`, its opening
    /// ledger movement. Both rows commit together or not at all.
    pub async fn create(&self, new: NewProduct) -> DbResult<Product> {
        validate_sku(&new.sku).map_err(storefront_core::CoreError::from)?;
        if new.initial_stock < 0 {
            return Err(DbError::Domain(storefront_core::CoreError::InvalidAdjustment(
                "initial stock cannot be negative".to_string(),
            )));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, description, price_minor, currency_code,
                stock_quantity, low_stock_threshold, backorder_allowed,
                is_active, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.sku)
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.price_minor)
        .bind(&new.currency_code)
        .bind(new.initial_stock)
        .bind(new.low_stock_threshold)
        .bind(new.backorder_allowed)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if new.initial_stock > 0 {
            sqlx::query(
                r#"
                INSERT INTO inventory_movements (
                    id, product_id, quantity_change, movement_type,
                    reference_id, notes, created_at
                )
                VALUES (?, ?, ?, ?, NULL, 'Opening stock', ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&id)
            .bind(new.initial_stock)
            .bind(MovementType::Initial)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(product_id = %id, sku = %new.sku, stock = new.initial_stock, "Product created");
        self.get_by_id(&id).await
    }

    /// Fetches a product by UUID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Product> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Fetches a product by SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Product> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE sku = ?")
            .bind(sku)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Product", sku))
    }

    /// Lists active products, newest first.
    pub async fn list_active(&self, limit: i64) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE is_active = 1 ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        debug!(count = products.len(), "Active products listed");
        Ok(products)
    }

    /// Soft-deletes a product. History (movements, order items) keeps
    /// pointing at the row.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE products SET is_active = 0, updated_at = ? WHERE id = ? AND is_active = 1",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        info!(product_id = %id, "Product deactivated");
        Ok(())
    }
}
