//! # storefront-db
//!
//! SQLite persistence for the order pipeline: connection pool, embedded
//! migrations, one repository per aggregate and the transactional
//! checkout orchestrator.
//!
//! ## Concurrency Contract
//! WAL mode allows concurrent readers but exactly one writer. Every
//! write that a stale read could invalidate (stock decrements, coupon
//! counter) is expressed as a guarded `UPDATE` whose `WHERE` clause
//! re-checks the business rule under the write lock. Zero affected rows
//! means the rule refused; the enclosing transaction rolls back and
//! nothing partial remains.
//!
//! ## Getting Started
//! ```rust,ignore
//! let db = Database::new(DbConfig::new("./storefront.db")).await?;
//! let outcome = db.checkout().place_order(request).await?;
//! ```

pub mod checkout;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use checkout::{CheckoutOrchestrator, CheckoutRequest, CompletedCheckout};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::coupon::CouponRepository;
pub use repository::inventory::{Adjustment, InventoryLedger, StockChange};
pub use repository::order::OrderRepository;
pub use repository::product::{NewProduct, ProductRepository};
pub use repository::tax::TaxRateRepository;
