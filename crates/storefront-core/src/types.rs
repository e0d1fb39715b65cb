//! # Domain Types
//!
//! Row-shaped domain types shared by the pure logic and the storage layer.
//!
//! ## Dual-Key Identity Pattern
//! Entities carry both:
//! - `id`: UUID v4 string - immutable, used for database relations
//! - a business identifier (sku, coupon code, order number) - human-readable
//!
//! ## Monetary Columns
//! Persisted rows store `*_minor` integers plus a `currency_code`; accessor
//! methods assemble [`MonetaryAmount`] values from the two columns wherever
//! money is read out of storage. There is no hidden computed-property magic,
//! just a constructor call.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::money::{Currency, MonetaryAmount};

// =============================================================================
// Product (catalog-owned; stock_quantity is ledger-owned)
// =============================================================================

/// A sellable product. The catalog is an external collaborator; the
/// transactional core reads price and stock policy from it, and the
/// inventory ledger is the sole writer of `stock_quantity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    /// Stock Keeping Unit - business identifier.
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    /// Unit price in minor units of `currency_code`.
    pub price_minor: i64,
    pub currency_code: String,
    /// Materialized stock counter. Must always equal the sum of this
    /// product's movement history from `initial` forward.
    pub stock_quantity: i64,
    /// At or below this level a negative adjustment raises a low-stock
    /// signal.
    pub low_stock_threshold: i64,
    /// Whether the stock counter may go negative (oversell).
    pub backorder_allowed: bool,
    /// Soft-delete flag.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// The unit price as a currency-tagged amount.
    pub fn price(&self) -> CoreResult<MonetaryAmount> {
        let currency: Currency = self.currency_code.parse()?;
        Ok(MonetaryAmount::from_minor(self.price_minor, currency))
    }

    /// Advisory availability check: `quantity <= 0` is always available;
    /// otherwise stock must cover it or backorders must be allowed.
    ///
    /// This does not lock anything. The authoritative check is the guarded
    /// ledger adjustment; callers must still handle `InsufficientStock`.
    pub fn can_fulfill(&self, quantity: i64) -> bool {
        if quantity <= 0 {
            return true;
        }
        self.stock_quantity >= quantity || self.backorder_allowed
    }
}

// =============================================================================
// Inventory movements
// =============================================================================

/// Why a stock level changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Stock left the building with an order.
    Sale,
    /// Stock came back from a returned order.
    Return,
    /// Stock arrived from a supplier.
    Restock,
    /// Manual correction.
    Adjustment,
    /// Opening balance when the product was first stocked.
    Initial,
}

/// One append-only entry in the stock ledger. Never updated, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InventoryMovement {
    pub id: String,
    pub product_id: String,
    /// Signed: positive for stock in, negative for stock out.
    pub quantity_change: i64,
    pub movement_type: MovementType,
    /// External reference, e.g. the order id for a sale.
    pub reference_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Coupons
// =============================================================================

/// How a coupon's `value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum CouponKind {
    /// `value` is basis points of the subtotal (1000 = 10% off).
    Percentage,
    /// `value` is minor units in `currency_code`.
    FixedAmount,
}

/// A discount coupon. `uses_count` only ever increases, and only on
/// successful redemption inside an order-creation transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Coupon {
    pub id: String,
    pub code: String,
    pub description: Option<String>,
    pub kind: CouponKind,
    /// Basis points for percentage coupons, minor units for fixed-amount.
    pub value: i64,
    /// Required for fixed-amount coupons.
    pub currency_code: Option<String>,
    pub max_uses: Option<i64>,
    pub uses_count: i64,
    pub max_uses_per_user: Option<i64>,
    pub min_purchase_minor: Option<i64>,
    pub min_purchase_currency: Option<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Coupon {
    /// Active and inside its validity window at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        if let Some(from) = self.valid_from {
            if now < from {
                return false;
            }
        }
        if let Some(to) = self.valid_to {
            if now > to {
                return false;
            }
        }
        true
    }

    /// Whether the global usage cap has been reached.
    pub fn usage_exhausted(&self) -> bool {
        matches!(self.max_uses, Some(max) if self.uses_count >= max)
    }
}

// =============================================================================
// Tax rates
// =============================================================================

/// A region-scoped tax rate. Several rates may match one address;
/// selection and compounding rules live in [`crate::tax`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TaxRate {
    pub id: String,
    pub name: String,
    /// ISO 3166-1 alpha-2 country code.
    pub country_code: String,
    /// ISO 3166-2 state/province code; unset means "whole country".
    pub state_code: Option<String>,
    pub postal_pattern: Option<String>,
    pub city: Option<String>,
    /// Basis points: 725 = 7.25%.
    pub rate_bps: u32,
    /// Compound rates apply to subtotal + tax accumulated so far.
    pub is_compound: bool,
    /// Lower numbers apply first.
    pub priority: i64,
    pub is_active: bool,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Addresses, carts, payments, customers (collaborator contracts)
// =============================================================================

/// A shipping address, resolved by the caller. Only the fields the tax
/// resolver matches on plus what the order row snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2 country code.
    pub country_code: String,
}

/// One line of a cart snapshot: which product, how many.
/// Unit prices are snapshotted from the catalog at checkout time, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub quantity: i64,
}

/// An immutable snapshot of a cart, handed to checkout by the cart
/// provider. Checkout consumes it; session identity stays with the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub lines: Vec<CartLine>,
}

impl CartSnapshot {
    pub fn new(lines: Vec<CartLine>) -> Self {
        CartSnapshot { lines }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// The payment collaborator's result contract. The core trusts `succeeded`
/// and only verifies amount and currency against its own computed total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    /// Gateway intent/charge identifier, stored on the order.
    pub id: String,
    pub amount_minor: i64,
    pub currency_code: String,
    pub succeeded: bool,
}

impl PaymentConfirmation {
    /// The confirmed amount as a currency-tagged value.
    pub fn amount(&self) -> CoreResult<MonetaryAmount> {
        let currency: Currency = self.currency_code.parse()?;
        Ok(MonetaryAmount::from_minor(self.amount_minor, currency))
    }
}

/// Who is placing the order. Identity resolution (sessions, auth) is the
/// caller's concern; the core only records one of the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Customer {
    User { id: String },
    Guest { email: String },
}

impl Customer {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Customer::User { id } => Some(id),
            Customer::Guest { .. } => None,
        }
    }

    pub fn guest_email(&self) -> Option<&str> {
        match self {
            Customer::User { .. } => None,
            Customer::Guest { email } => Some(email),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product(stock: i64, backorder: bool) -> Product {
        let now = Utc::now();
        Product {
            id: "p-1".to_string(),
            sku: "LAVENDER-50".to_string(),
            name: "Lavender Oil 50ml".to_string(),
            description: None,
            price_minor: 2499,
            currency_code: "USD".to_string(),
            stock_quantity: stock,
            low_stock_threshold: 5,
            backorder_allowed: backorder,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn can_fulfill_is_advisory_stock_check() {
        let p = product(3, false);
        assert!(p.can_fulfill(3));
        assert!(!p.can_fulfill(4));
        // zero or negative quantities are trivially available
        assert!(p.can_fulfill(0));
        assert!(p.can_fulfill(-1));
    }

    #[test]
    fn backorder_allows_overselling() {
        let p = product(0, true);
        assert!(p.can_fulfill(10));
    }

    #[test]
    fn product_price_is_currency_tagged() {
        let p = product(1, false);
        let price = p.price().unwrap();
        assert_eq!(price.minor(), 2499);
        assert_eq!(price.currency(), Currency::Usd);
    }

    #[test]
    fn coupon_validity_window() {
        let now = Utc::now();
        let mut coupon = Coupon {
            id: "c-1".to_string(),
            code: "SAVE10".to_string(),
            description: None,
            kind: CouponKind::Percentage,
            value: 1000,
            currency_code: None,
            max_uses: Some(5),
            uses_count: 0,
            max_uses_per_user: None,
            min_purchase_minor: None,
            min_purchase_currency: None,
            valid_from: Some(now - chrono::Duration::days(1)),
            valid_to: Some(now + chrono::Duration::days(1)),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        assert!(coupon.is_live(now));

        coupon.is_active = false;
        assert!(!coupon.is_live(now));

        coupon.is_active = true;
        coupon.valid_to = Some(now - chrono::Duration::hours(1));
        assert!(!coupon.is_live(now));
    }

    #[test]
    fn coupon_usage_exhaustion() {
        let now = Utc::now();
        let coupon = Coupon {
            id: "c-1".to_string(),
            code: "ONCE".to_string(),
            description: None,
            kind: CouponKind::FixedAmount,
            value: 500,
            currency_code: Some("USD".to_string()),
            max_uses: Some(1),
            uses_count: 1,
            max_uses_per_user: None,
            min_purchase_minor: None,
            min_purchase_currency: None,
            valid_from: None,
            valid_to: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        assert!(coupon.usage_exhausted());
    }

    #[test]
    fn customer_identity_accessors() {
        let user = Customer::User { id: "u-1".to_string() };
        assert_eq!(user.user_id(), Some("u-1"));
        assert_eq!(user.guest_email(), None);

        let guest = Customer::Guest { email: "g@example.com".to_string() };
        assert_eq!(guest.user_id(), None);
        assert_eq!(guest.guest_email(), Some("g@example.com"));
    }
}
