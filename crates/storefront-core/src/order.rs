//! # Order Aggregate
//!
//! The order row, its line items, and the lifecycle state machine.
//!
//! ## Lifecycle
//!
//! ```text
//! pending_payment ──> paid ──> processing ──> shipped ──> delivered ──> completed
//!                      │            │            (requires tracking + carrier)
//!                      │            └──> cancelled
//!                      ├──> cancelled
//!                      └──> disputed ──> refunded
//! ```
//!
//! `completed`, `cancelled` and `refunded` are terminal. Every transition
//! goes through [`Order::transition`]; there is no way to set the status
//! field directly from outside this module.
//!
//! ## Financial Invariant
//!
//! `total == subtotal - discount + shipping + tax`, all five in the same
//! currency. [`Order::new`] computes the total from the parts and
//! [`Order::verify_totals`] re-checks a loaded row, so a hand-edited or
//! corrupted row is caught before anything downstream trusts it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::{Currency, MonetaryAmount};
use crate::types::{Address, Customer};

// =============================================================================
// Status enums
// =============================================================================

/// Fulfilment status of an order. See the module docs for the transition
/// graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingPayment,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Completed,
    Cancelled,
    Disputed,
    Refunded,
}

impl OrderStatus {
    /// Whether the state machine allows moving from `self` to `target`.
    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, target),
            (PendingPayment, Paid)
                | (Paid, Processing)
                | (Paid, Cancelled)
                | (Paid, Disputed)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Shipped, Delivered)
                | (Delivered, Completed)
                | (Disputed, Refunded)
        )
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Disputed => "disputed",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settlement status of the payment attached to an order. Tracked
/// separately from fulfilment so a refund can be recorded without
/// rewriting fulfilment history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

// =============================================================================
// Order row
// =============================================================================

/// Everything needed to construct an order besides the computed total.
/// Amounts must all share one currency; [`Order::new`] checks.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub customer: Customer,
    pub shipping_address: Address,
    pub subtotal: MonetaryAmount,
    pub discount: MonetaryAmount,
    pub shipping: MonetaryAmount,
    pub tax: MonetaryAmount,
    pub coupon_id: Option<String>,
    pub coupon_code: Option<String>,
    pub payment_intent_id: Option<String>,
}

/// One persisted order. Monetary columns are minor units in
/// `currency_code`; the denormalized shipping address is a snapshot, not a
/// reference, so later address edits never rewrite history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub id: String,
    /// Business identifier, e.g. `ORD-20260829-4F7A2B`.
    pub order_number: String,
    pub user_id: Option<String>,
    pub guest_email: Option<String>,
    pub shipping_name: String,
    pub shipping_line1: String,
    pub shipping_line2: Option<String>,
    pub shipping_city: String,
    pub shipping_state: Option<String>,
    pub shipping_postal_code: String,
    pub shipping_country: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_intent_id: Option<String>,
    pub subtotal_minor: i64,
    pub discount_minor: i64,
    pub shipping_minor: i64,
    pub tax_minor: i64,
    pub total_minor: i64,
    pub currency_code: String,
    pub coupon_id: Option<String>,
    pub coupon_code_applied: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a new `pending_payment` order, computing
    /// `total = subtotal - discount + shipping + tax`.
    ///
    /// Fails with `CurrencyMismatch` if the four amounts disagree on
    /// currency, and with `ConsistencyFault` if the parts produce a
    /// negative total.
    pub fn new(id: String, params: NewOrder, now: DateTime<Utc>) -> CoreResult<Self> {
        let NewOrder {
            order_number,
            customer,
            shipping_address,
            subtotal,
            discount,
            shipping,
            tax,
            coupon_id,
            coupon_code,
            payment_intent_id,
        } = params;

        let total = subtotal.subtract(discount)?.add(shipping)?.add(tax)?;
        if total.is_negative() {
            return Err(CoreError::ConsistencyFault(format!(
                "order {order_number}: computed total {total} is negative"
            )));
        }

        Ok(Order {
            id,
            order_number,
            user_id: customer.user_id().map(str::to_string),
            guest_email: customer.guest_email().map(str::to_string),
            shipping_name: shipping_address.name,
            shipping_line1: shipping_address.line1,
            shipping_line2: shipping_address.line2,
            shipping_city: shipping_address.city,
            shipping_state: shipping_address.state,
            shipping_postal_code: shipping_address.postal_code,
            shipping_country: shipping_address.country_code,
            status: OrderStatus::PendingPayment,
            payment_status: PaymentStatus::Pending,
            payment_intent_id,
            subtotal_minor: subtotal.minor(),
            discount_minor: discount.minor(),
            shipping_minor: shipping.minor(),
            tax_minor: tax.minor(),
            total_minor: total.minor(),
            currency_code: total.currency().code().to_string(),
            coupon_id,
            coupon_code_applied: coupon_code,
            paid_at: None,
            tracking_number: None,
            carrier: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn currency(&self) -> CoreResult<Currency> {
        self.currency_code.parse()
    }

    pub fn total(&self) -> CoreResult<MonetaryAmount> {
        Ok(MonetaryAmount::from_minor(self.total_minor, self.currency()?))
    }

    pub fn subtotal(&self) -> CoreResult<MonetaryAmount> {
        Ok(MonetaryAmount::from_minor(self.subtotal_minor, self.currency()?))
    }

    /// Re-derives the total from the stored parts and compares it to the
    /// stored total. A mismatch means the row was written or mutated
    /// outside the aggregate and must not be trusted.
    pub fn verify_totals(&self) -> CoreResult<()> {
        let expected = self.subtotal_minor - self.discount_minor
            + self.shipping_minor
            + self.tax_minor;
        if expected != self.total_minor {
            return Err(CoreError::ConsistencyFault(format!(
                "order {}: stored total {} does not match computed total {} \
                 (subtotal {} - discount {} + shipping {} + tax {})",
                self.order_number,
                self.total_minor,
                expected,
                self.subtotal_minor,
                self.discount_minor,
                self.shipping_minor,
                self.tax_minor,
            )));
        }
        Ok(())
    }

    /// Moves the order to `target`, returning the status it left behind.
    ///
    /// Side effects of specific transitions:
    /// - into `Paid`: sets `paid_at` and marks the payment `Succeeded`
    /// - into `Shipped`: requires `tracking` and `carrier`, records both
    /// - into `Refunded`: marks the payment `Refunded`
    pub fn transition(
        &mut self,
        target: OrderStatus,
        tracking: Option<ShipmentInfo>,
        now: DateTime<Utc>,
    ) -> CoreResult<OrderStatus> {
        if !self.status.can_transition_to(target) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }

        match target {
            OrderStatus::Paid => {
                self.paid_at = Some(now);
                self.payment_status = PaymentStatus::Succeeded;
            }
            OrderStatus::Shipped => {
                let info = tracking.ok_or_else(|| {
                    CoreError::Validation(crate::error::ValidationError::Required {
                        field: "tracking_number and carrier".to_string(),
                    })
                })?;
                self.tracking_number = Some(info.tracking_number);
                self.carrier = Some(info.carrier);
            }
            OrderStatus::Refunded => {
                self.payment_status = PaymentStatus::Refunded;
            }
            _ => {}
        }

        let old = self.status;
        self.status = target;
        self.updated_at = now;
        Ok(old)
    }
}

/// Tracking details required to mark an order shipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentInfo {
    pub tracking_number: String,
    pub carrier: String,
}

// =============================================================================
// Order items
// =============================================================================

/// One line of an order. `sku_snapshot`, `name_snapshot` and
/// `unit_price_minor` are frozen at checkout so later catalog edits never
/// change what the customer was billed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub sku_snapshot: String,
    pub name_snapshot: String,
    pub quantity: i64,
    pub unit_price_minor: i64,
    pub total_price_minor: i64,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    /// Builds a line item, computing `total_price = unit_price * quantity`.
    pub fn new(
        id: String,
        order_id: String,
        product: &crate::types::Product,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        let unit_price = product.price()?;
        let line_total = unit_price.multiply_by(quantity);
        Ok(OrderItem {
            id,
            order_id,
            product_id: product.id.clone(),
            sku_snapshot: product.sku.clone(),
            name_snapshot: product.name.clone(),
            quantity,
            unit_price_minor: unit_price.minor(),
            total_price_minor: line_total.minor(),
            created_at: now,
        })
    }

    /// Re-checks `total_price == unit_price * quantity` on a loaded row.
    pub fn verify_total(&self) -> CoreResult<()> {
        if self.unit_price_minor * self.quantity != self.total_price_minor {
            return Err(CoreError::ConsistencyFault(format!(
                "order item {}: stored total {} != unit {} * quantity {}",
                self.id, self.total_price_minor, self.unit_price_minor, self.quantity
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
