//! # Error Types
//!
//! Domain error taxonomy for the transactional core.
//!
//! Three tiers, matching how callers must react:
//!
//! - [`ValidationError`] - malformed input (zero quantity, bad code format).
//!   Rejected before any transaction opens.
//! - [`CoreError`] domain-rule variants (insufficient stock, invalid coupon,
//!   currency mismatch, ...) - rejected inside a transaction, the whole
//!   transaction rolls back, and the caller gets the specific reason.
//! - [`CoreError::ConsistencyFault`] - an internal invariant broke (order
//!   totals, ledger sum). Fatal; logged and surfaced generically, never
//!   silently patched.

use thiserror::Error;

use crate::money::{Currency, MonetaryAmount};
use crate::order::OrderStatus;

/// Business-rule and internal-consistency errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Currency code not in the recognized ISO 4217 set.
    #[error("Unrecognized currency code: {0}")]
    InvalidCurrency(String),

    /// Binary monetary operation across two different currencies.
    /// Never silently coerced.
    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: Currency, right: Currency },

    /// Cart lines resolve to more than one currency.
    #[error("Cart lines have mixed currencies")]
    MixedCurrencyCart,

    /// Checkout invoked with an empty cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// Product does not exist (or is soft-deleted).
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// A stock adjustment would drive the counter negative and the product
    /// does not allow backorders. Nothing was written.
    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Stock adjustment rejected before any transaction opened
    /// (zero quantity change).
    #[error("Invalid stock adjustment: {0}")]
    InvalidAdjustment(String),

    /// Coupon failed validation; the variant carries the first check
    /// that failed.
    #[error(transparent)]
    Coupon(#[from] CouponRejection),

    /// The payment confirmation reports a charge that did not go through.
    #[error("Payment {0} did not succeed")]
    PaymentFailed(String),

    /// The payment confirmation's amount does not equal the computed
    /// order total.
    #[error("Payment amount mismatch: expected {expected}, payment confirms {received}")]
    PaymentAmountMismatch {
        expected: MonetaryAmount,
        received: MonetaryAmount,
    },

    /// Requested order status is not reachable from the current one.
    #[error("Invalid order status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// An internal invariant does not hold (order totals arithmetic,
    /// ledger sum vs stock counter). Fatal, never auto-corrected.
    #[error("Consistency fault: {0}")]
    ConsistencyFault(String),

    /// Input validation failure (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Input validation errors.
///
/// Raised before business logic runs; no transaction is opened.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (bad currency code, malformed decimal, ...).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

/// Why a coupon was rejected. Checks run in a fixed order; the first
/// failure wins, so the caller can render an actionable message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CouponRejection {
    #[error("Coupon '{0}' not found")]
    NotFound(String),

    /// Inactive, not yet valid, or past its validity window.
    #[error("Coupon '{0}' is no longer valid or has expired")]
    Expired(String),

    #[error("Coupon '{0}' has reached its usage limit")]
    UsageLimitReached(String),

    /// The coupon's currency differs from the cart's.
    #[error("Coupon '{0}' currency does not match the cart")]
    CurrencyMismatch(String),

    #[error("Cart subtotal does not meet the minimum purchase of {minimum} for coupon '{code}'")]
    MinimumSpendNotMet {
        code: String,
        minimum: MonetaryAmount,
    },

    #[error("Coupon '{0}' usage limit reached for this customer")]
    PerUserLimitReached(String),
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
