//! # storefront-core
//!
//! Pure domain logic for the order pipeline: money arithmetic, the order
//! state machine, coupon eligibility, tax resolution, input validation and
//! the signal vocabulary. No I/O, no persistence, no async.
//!
//! The companion crate `storefront-db` wires these rules into SQLite
//! transactions; everything here is deterministic and unit-testable in
//! isolation.
//!
//! ## Modules
//!
//! - [`money`]: integer-minor-unit [`MonetaryAmount`] with a [`Currency`] tag
//! - [`types`]: products, movements, coupons, tax rates, carts, payments
//! - [`order`]: the order aggregate and its lifecycle state machine
//! - [`coupon`]: ordered coupon rejection rules and discount arithmetic
//! - [`tax`]: rate matching and compound tax calculation
//! - [`validation`]: field-level input checks
//! - [`events`]: post-commit [`Signal`]s and the [`Notifier`] sink
//! - [`error`]: the error taxonomy shared across both crates

pub mod coupon;
pub mod error;
pub mod events;
pub mod money;
pub mod order;
pub mod tax;
pub mod types;
pub mod validation;

pub use error::{CoreError, CoreResult, CouponRejection, ValidationError};
pub use events::{Notifier, NullNotifier, Signal, TracingNotifier};
pub use money::{Currency, MonetaryAmount, DEFAULT_CURRENCY};
pub use order::{NewOrder, Order, OrderItem, OrderStatus, PaymentStatus, ShipmentInfo};
pub use types::{
    Address, CartLine, CartSnapshot, Coupon, CouponKind, Customer, InventoryMovement,
    MovementType, PaymentConfirmation, Product, TaxRate,
};
