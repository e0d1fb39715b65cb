//! # Checkout Orchestration
//!
//! Turns a cart snapshot plus a payment confirmation into a paid order,
//! atomically.
//!
//! ## Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  place_order(request)                                                   │
//! │                                                                         │
//! │  Phase 1: pure computation (no transaction open)                        │
//! │    1. validate cart: non-empty, positive quantities                     │
//! │    2. load products: active, advisory stock check, one currency         │
//! │    3. subtotal = Σ unit price × quantity                                │
//! │    4. coupon: lookup → eligibility → discount                           │
//! │    5. tax rates for the address, tax on (subtotal - discount)           │
//! │    6. total = subtotal - discount + shipping + tax                      │
//! │    7. verify payment: succeeded, amount == total, same currency         │
//! │                                                                         │
//! │  Phase 2: one transaction (all-or-nothing)                              │
//! │    8. INSERT order (paid) + items   ← first write takes the WAL lock    │
//! │    9. guarded stock decrement per line (no partial write on failure)    │
//! │   10. guarded coupon counter claim                                      │
//! │   COMMIT                                                                │
//! │                                                                         │
//! │  After commit: emit OrderPlaced + StockChanged (+ LowStockReached)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Phase 1 reads committed state without locks, so its answers can go
//! stale; phase 2's guarded statements re-check stock and coupon caps
//! under the write lock. Any failure in phase 2 rolls the whole
//! transaction back: no order row, no movements, no counter changes.

use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use storefront_core::coupon::{calculate_discount, check_coupon};
use storefront_core::tax::{applicable_rates, calculate_tax};
use storefront_core::validation::validate_quantity;
use storefront_core::{
    Address, CartSnapshot, CoreError, Coupon, Currency, Customer, MonetaryAmount, MovementType,
    NewOrder, Notifier, Order, OrderItem, OrderStatus, PaymentConfirmation, Product, Signal,
};

use crate::error::{DbError, DbResult};
use crate::repository::coupon::apply_redemption;
use crate::repository::inventory::{apply_adjustment, Adjustment};
use crate::repository::order::{generate_order_number, insert_items, insert_order};

/// Everything checkout needs from its collaborators. The cart snapshot is
/// consumed; a caller that wants to retry after a retryable error
/// re-snapshots the cart.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub customer: Customer,
    pub cart: CartSnapshot,
    pub shipping_address: Address,
    /// Shipping cost resolved by the caller's shipping method.
    pub shipping_cost: MonetaryAmount,
    pub coupon_code: Option<String>,
    pub payment: PaymentConfirmation,
}

/// The committed result: the paid order and its line items.
#[derive(Debug, Clone)]
pub struct CompletedCheckout {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Orchestrates the checkout pipeline. Stateless; cheap to construct per
/// request via [`crate::pool::Database::checkout`].
#[derive(Clone)]
pub struct CheckoutOrchestrator {
    pool: SqlitePool,
    notifier: Arc<dyn Notifier>,
}

impl CheckoutOrchestrator {
    pub fn new(pool: SqlitePool, notifier: Arc<dyn Notifier>) -> Self {
        CheckoutOrchestrator { pool, notifier }
    }

    /// Runs the full pipeline. On success the order exists in `paid`
    /// status, stock is decremented with `sale` movements, and the coupon
    /// counter (if any) is claimed. On any error nothing is written.
    pub async fn place_order(&self, request: CheckoutRequest) -> DbResult<CompletedCheckout> {
        let CheckoutRequest {
            customer,
            cart,
            shipping_address,
            shipping_cost,
            coupon_code,
            payment,
        } = request;

        // ----- Phase 1: validate and price -----

        if cart.is_empty() {
            return Err(DbError::Domain(CoreError::EmptyCart));
        }
        for line in &cart.lines {
            validate_quantity(line.quantity).map_err(CoreError::from)?;
        }

        let products = self.load_products(&cart).await?;

        // Advisory availability check: reject an obviously short cart
        // before any pricing work. The guarded decrement inside the
        // transaction stays the authoritative answer.
        for line in &cart.lines {
            let product = &products[&line.product_id];
            if !product.can_fulfill(line.quantity) {
                return Err(DbError::Domain(CoreError::InsufficientStock {
                    product_id: product.id.clone(),
                    available: product.stock_quantity,
                    requested: line.quantity,
                }));
            }
        }

        let currency = cart_currency(&cart, &products)?;

        let mut subtotal = MonetaryAmount::zero(currency);
        for line in &cart.lines {
            let product = &products[&line.product_id];
            let line_total = product.price().map_err(DbError::Domain)?.multiply_by(line.quantity);
            subtotal = subtotal.add(line_total).map_err(DbError::Domain)?;
        }

        let now = Utc::now();
        let coupon = self.resolve_coupon(coupon_code.as_deref(), &customer, subtotal).await?;
        let discount = match &coupon {
            Some(c) => calculate_discount(c, subtotal),
            None => MonetaryAmount::zero(currency),
        };

        let taxable = subtotal.subtract(discount).map_err(DbError::Domain)?;
        let candidates = self.tax_rates_for(&shipping_address).await?;
        let matched = applicable_rates(&candidates, &shipping_address, now.date_naive());
        let tax = calculate_tax(&matched, taxable).total;

        if shipping_cost.currency() != currency {
            return Err(DbError::Domain(CoreError::CurrencyMismatch {
                left: currency,
                right: shipping_cost.currency(),
            }));
        }

        // ----- Step 7: verify the payment against our own arithmetic -----

        let total = taxable
            .add(shipping_cost)
            .and_then(|t| t.add(tax))
            .map_err(DbError::Domain)?;

        if !payment.succeeded {
            return Err(DbError::Domain(CoreError::PaymentFailed(payment.id)));
        }
        let paid = payment.amount().map_err(DbError::Domain)?;
        if paid != total {
            return Err(DbError::Domain(CoreError::PaymentAmountMismatch {
                expected: total,
                received: paid,
            }));
        }

        // ----- Phase 2: the transaction -----

        let order_id = Uuid::new_v4().to_string();
        let order_number = generate_order_number();
        let mut order = Order::new(
            order_id.clone(),
            NewOrder {
                order_number: order_number.clone(),
                customer,
                shipping_address,
                subtotal,
                discount,
                shipping: shipping_cost,
                tax,
                coupon_id: coupon.as_ref().map(|c| c.id.clone()),
                coupon_code: coupon.as_ref().map(|c| c.code.clone()),
                payment_intent_id: Some(payment.id.clone()),
            },
            now,
        )
        .map_err(DbError::Domain)?;
        // The payment is already confirmed, so the order commits directly
        // in `paid`; the pending_payment -> paid edge still runs through
        // the state machine and still announces itself after the commit.
        let previous_status = order
            .transition(OrderStatus::Paid, None, now)
            .map_err(DbError::Domain)?;

        let mut items = Vec::with_capacity(cart.lines.len());
        for line in &cart.lines {
            let product = &products[&line.product_id];
            let item = OrderItem::new(
                Uuid::new_v4().to_string(),
                order_id.clone(),
                product,
                line.quantity,
                now,
            )
            .map_err(DbError::Domain)?;
            items.push(item);
        }

        let mut tx = self.pool.begin().await?;

        insert_order(&mut tx, &order).await?;
        insert_items(&mut tx, &items).await?;

        let mut pending_signals = vec![
            Signal::OrderPlaced {
                order_id: order.id.clone(),
                order_number: order.order_number.clone(),
                total_minor: order.total_minor,
                currency_code: order.currency_code.clone(),
            },
            Signal::OrderStatusChanged {
                order_id: order.id.clone(),
                order_number: order.order_number.clone(),
                old_status: previous_status,
                new_status: order.status,
            },
        ];

        for line in &cart.lines {
            let outcome = apply_adjustment(
                &mut tx,
                &Adjustment {
                    product_id: line.product_id.clone(),
                    quantity_change: -line.quantity,
                    movement_type: MovementType::Sale,
                    reference_id: Some(order_number.clone()),
                    notes: Some(format!("Order #{order_number}")),
                },
            )
            .await?;
            pending_signals.extend(outcome.signals);
        }

        if let Some(c) = &coupon {
            apply_redemption(&mut tx, &c.id, &c.code).await?;
        }

        tx.commit().await?;

        for signal in &pending_signals {
            self.notifier.notify(signal);
        }

        info!(
            order_number = %order.order_number,
            total = %total,
            lines = items.len(),
            coupon = coupon.as_ref().map(|c| c.code.as_str()).unwrap_or("-"),
            "Order placed"
        );
        Ok(CompletedCheckout { order, items })
    }

    /// Loads and vets every product the cart references.
    async fn load_products(&self, cart: &CartSnapshot) -> DbResult<HashMap<String, Product>> {
        let mut products = HashMap::with_capacity(cart.lines.len());
        for line in &cart.lines {
            let product =
                sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
                    .bind(&line.product_id)
                    .fetch_optional(&self.pool)
                    .await?
                    .filter(|p| p.is_active)
                    .ok_or_else(|| {
                        DbError::Domain(CoreError::ProductNotFound(line.product_id.clone()))
                    })?;
            products.insert(line.product_id.clone(), product);
        }
        debug!(count = products.len(), "Cart products loaded");
        Ok(products)
    }

    /// Looks the coupon up and runs the ordered eligibility checks.
    async fn resolve_coupon(
        &self,
        code: Option<&str>,
        customer: &Customer,
        subtotal: MonetaryAmount,
    ) -> DbResult<Option<Coupon>> {
        let Some(code) = code else { return Ok(None) };

        let repo = crate::repository::coupon::CouponRepository::new(self.pool.clone());
        let coupon = repo.find_by_code(code).await?;

        let user_redemptions = match (&coupon, customer.user_id()) {
            (Some(c), Some(user_id)) => repo.redemption_count_for_user(&c.id, user_id).await?,
            _ => 0,
        };

        check_coupon(code, coupon.as_ref(), subtotal, user_redemptions, Utc::now())
            .map_err(|r| DbError::Domain(CoreError::Coupon(r)))?;
        Ok(coupon)
    }

    async fn tax_rates_for(&self, address: &Address) -> DbResult<Vec<storefront_core::TaxRate>> {
        crate::repository::tax::TaxRateRepository::new(self.pool.clone())
            .rates_for(address)
            .await
    }
}

impl std::fmt::Debug for CheckoutOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutOrchestrator").finish_non_exhaustive()
    }
}

/// Resolves the cart's single currency, rejecting mixed-currency carts.
fn cart_currency(
    cart: &CartSnapshot,
    products: &HashMap<String, Product>,
) -> DbResult<Currency> {
    let mut currency: Option<Currency> = None;
    for line in &cart.lines {
        let code: Currency = products[&line.product_id]
            .currency_code
            .parse()
            .map_err(DbError::Domain)?;
        match currency {
            None => currency = Some(code),
            Some(existing) if existing == code => {}
            Some(_) => return Err(DbError::Domain(CoreError::MixedCurrencyCart)),
        }
    }
    currency.ok_or(DbError::Domain(CoreError::EmptyCart))
}
