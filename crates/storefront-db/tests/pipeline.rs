//! End-to-end tests for the order pipeline: ledger discipline, checkout
//! atomicity, coupon redemption and the order lifecycle, all against real
//! SQLite databases.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use storefront_core::{
    Address, CartLine, CartSnapshot, CoreError, CouponRejection, Currency, Customer,
    MonetaryAmount, Notifier, OrderStatus, PaymentConfirmation, PaymentStatus, ShipmentInfo,
    Signal,
};
use storefront_db::{CheckoutRequest, Database, DbConfig, DbError, NewProduct};

/// Collects every signal for assertions.
#[derive(Default)]
struct CaptureNotifier {
    signals: Mutex<Vec<Signal>>,
}

impl CaptureNotifier {
    fn kinds(&self) -> Vec<&'static str> {
        self.signals.lock().unwrap().iter().map(|s| s.kind()).collect()
    }
}

impl Notifier for CaptureNotifier {
    fn notify(&self, signal: &Signal) {
        self.signals.lock().unwrap().push(signal.clone());
    }
}

/// Routes crate logs into the test harness; `RUST_LOG` filters as usual.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn memory_db() -> (Database, Arc<CaptureNotifier>) {
    init_tracing();
    let capture = Arc::new(CaptureNotifier::default());
    let db = Database::with_notifier(DbConfig::in_memory(), capture.clone())
        .await
        .expect("in-memory database");
    (db, capture)
}

async fn seed_product(db: &Database, sku: &str, price_minor: i64, stock: i64) -> String {
    let product = db
        .products()
        .create(NewProduct {
            sku: sku.to_string(),
            name: format!("Product {sku}"),
            description: None,
            price_minor,
            currency_code: "USD".to_string(),
            initial_stock: stock,
            low_stock_threshold: 2,
            backorder_allowed: false,
        })
        .await
        .expect("seed product");
    product.id
}

async fn seed_percentage_coupon(
    db: &Database,
    code: &str,
    value_bps: i64,
    max_uses: Option<i64>,
    uses_count: i64,
) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO coupons (
            id, code, description, kind, value, currency_code,
            max_uses, uses_count, max_uses_per_user,
            min_purchase_minor, min_purchase_currency,
            valid_from, valid_to, is_active, created_at, updated_at
        )
        VALUES (?, ?, NULL, 'percentage', ?, NULL, ?, ?, NULL, NULL, NULL, NULL, NULL, 1, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(code)
    .bind(value_bps)
    .bind(max_uses)
    .bind(uses_count)
    .bind(now)
    .bind(now)
    .execute(db.pool())
    .await
    .expect("seed coupon");
    id
}

async fn seed_tax_rate(db: &Database, country: &str, rate_bps: i64) {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO tax_rates (
            id, name, country_code, state_code, postal_pattern, city,
            rate_bps, is_compound, priority, is_active,
            valid_from, valid_to, created_at, updated_at
        )
        VALUES (?, ?, ?, NULL, NULL, NULL, ?, 0, 10, 1, NULL, NULL, ?, ?)
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(format!("{country} sales tax"))
    .bind(country)
    .bind(rate_bps)
    .bind(now)
    .bind(now)
    .execute(db.pool())
    .await
    .expect("seed tax rate");
}

fn us_address() -> Address {
    Address {
        name: "Jordan Doe".to_string(),
        line1: "42 Market St".to_string(),
        line2: None,
        city: "Springfield".to_string(),
        state: Some("IL".to_string()),
        postal_code: "62701".to_string(),
        country_code: "US".to_string(),
    }
}

fn usd(minor: i64) -> MonetaryAmount {
    MonetaryAmount::from_minor(minor, Currency::Usd)
}

fn request(
    product_id: &str,
    quantity: i64,
    coupon_code: Option<&str>,
    paid_minor: i64,
) -> CheckoutRequest {
    CheckoutRequest {
        customer: Customer::User { id: "u-1".to_string() },
        cart: CartSnapshot::new(vec![CartLine {
            product_id: product_id.to_string(),
            quantity,
        }]),
        shipping_address: us_address(),
        shipping_cost: usd(500),
        coupon_code: coupon_code.map(str::to_string),
        payment: PaymentConfirmation {
            id: "pi_test_1".to_string(),
            amount_minor: paid_minor,
            currency_code: "USD".to_string(),
            succeeded: true,
        },
    }
}

// =============================================================================
// Inventory ledger
// =============================================================================

#[tokio::test]
async fn ledger_keeps_counter_and_movements_in_lockstep() {
    let (db, _) = memory_db().await;
    let product_id = seed_product(&db, "OIL-50", 2500, 10).await;
    let ledger = db.inventory();

    let change = ledger.decrease_on_sale(&product_id, 3, "ORD-TEST-1").await.unwrap();
    assert_eq!(change.new_level, 7);
    assert_eq!(change.movement.quantity_change, -3);
    assert_eq!(change.movement.reference_id.as_deref(), Some("ORD-TEST-1"));
    let change = ledger.increase_on_return(&product_id, 1, "ORD-TEST-1").await.unwrap();
    assert_eq!(change.new_level, 8);
    assert_eq!(change.movement.quantity_change, 1);
    let change = ledger.restock(&product_id, 5, None).await.unwrap();
    assert_eq!(change.new_level, 13);
    assert_eq!(change.movement.notes.as_deref(), Some("Product restock"));
    let change = ledger
        .restock(&product_id, 2, Some("Supplier delivery #88".to_string()))
        .await
        .unwrap();
    assert_eq!(change.new_level, 15);
    assert_eq!(change.movement.notes.as_deref(), Some("Supplier delivery #88"));

    // initial + sale + return + two restocks
    let movements = ledger.movements(&product_id, 50).await.unwrap();
    assert_eq!(movements.len(), 5);
    assert!(movements.iter().any(|m| m.id == change.movement.id));

    ledger.audit(&product_id).await.unwrap();
}

#[tokio::test]
async fn overdraw_writes_nothing() {
    let (db, _) = memory_db().await;
    let product_id = seed_product(&db, "OIL-30", 1800, 3).await;
    let ledger = db.inventory();

    let err = ledger.decrease_on_sale(&product_id, 5, "ORD-TEST-2").await.unwrap_err();
    match err {
        DbError::Domain(CoreError::InsufficientStock {
            available,
            requested,
            ..
        }) => {
            assert_eq!(available, 3);
            assert_eq!(requested, 5);
        }
        other => panic!("unexpected error: {other}"),
    }

    // counter untouched, no movement row besides the opening one
    assert_eq!(ledger.stock_level(&product_id).await.unwrap(), 3);
    assert_eq!(ledger.movements(&product_id, 50).await.unwrap().len(), 1);
    ledger.audit(&product_id).await.unwrap();
}

#[tokio::test]
async fn negative_adjustment_at_threshold_raises_low_stock() {
    let (db, capture) = memory_db().await;
    // threshold is 2 in the seed helper
    let product_id = seed_product(&db, "OIL-10", 900, 4).await;

    db.inventory().decrease_on_sale(&product_id, 2, "ORD-TEST-3").await.unwrap();

    let kinds = capture.kinds();
    assert!(kinds.contains(&"inventory.stock_changed"));
    assert!(kinds.contains(&"inventory.low_stock"));
}

#[tokio::test]
async fn concurrent_overdraw_admits_exactly_one_winner() {
    init_tracing();
    // File-backed database: in-memory SQLite is per-connection.
    let dir = tempfile::tempdir().unwrap();
    let config = DbConfig::new(dir.path().join("pipeline.db")).max_connections(5);
    let db = Database::new(config).await.unwrap();
    let product_id = seed_product(&db, "LAST-UNIT", 5000, 1).await;

    let a = {
        let ledger = db.inventory();
        let id = product_id.clone();
        tokio::spawn(async move { ledger.decrease_on_sale(&id, 1, "ORD-A").await })
    };
    let b = {
        let ledger = db.inventory();
        let id = product_id.clone();
        tokio::spawn(async move { ledger.decrease_on_sale(&id, 1, "ORD-B").await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one sale may claim the last unit");
    let failure = results.iter().find(|r| r.is_err()).unwrap();
    assert!(matches!(
        failure,
        Err(DbError::Domain(CoreError::InsufficientStock { .. }))
    ));

    assert_eq!(db.inventory().stock_level(&product_id).await.unwrap(), 0);
    db.inventory().audit(&product_id).await.unwrap();
}

// =============================================================================
// Checkout
// =============================================================================

#[tokio::test]
async fn checkout_prices_discounts_taxes_and_decrements() {
    let (db, capture) = memory_db().await;
    let product_id = seed_product(&db, "OIL-100", 2500, 10).await;
    seed_percentage_coupon(&db, "SAVE10", 1000, Some(5), 0).await;
    seed_tax_rate(&db, "US", 700).await;

    // subtotal 4 x 2500 = 10000; discount 10% = 1000; tax 7% of 9000 = 630;
    // shipping 500; total 10130
    let outcome = db
        .checkout()
        .place_order(request(&product_id, 4, Some("SAVE10"), 10_130))
        .await
        .unwrap();

    let order = &outcome.order;
    assert_eq!(order.subtotal_minor, 10_000);
    assert_eq!(order.discount_minor, 1_000);
    assert_eq!(order.tax_minor, 630);
    assert_eq!(order.shipping_minor, 500);
    assert_eq!(order.total_minor, 10_130);
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.payment_status, PaymentStatus::Succeeded);
    assert!(order.paid_at.is_some());
    assert_eq!(order.coupon_code_applied.as_deref(), Some("SAVE10"));
    assert_eq!(outcome.items.len(), 1);
    assert_eq!(outcome.items[0].total_price_minor, 10_000);

    // stock decremented and journaled
    assert_eq!(db.inventory().stock_level(&product_id).await.unwrap(), 6);
    db.inventory().audit(&product_id).await.unwrap();

    // coupon counter claimed
    let coupon = db.coupons().find_by_code("SAVE10").await.unwrap().unwrap();
    assert_eq!(coupon.uses_count, 1);

    // stored row round-trips through the invariant check
    let loaded = db.orders().get_by_id(&order.id).await.unwrap();
    assert_eq!(loaded.total_minor, 10_130);

    assert!(capture.kinds().contains(&"order.placed"));
    // the pending_payment -> paid edge announces itself too
    let paid_edge = capture
        .signals
        .lock()
        .unwrap()
        .iter()
        .any(|s| matches!(
            s,
            Signal::OrderStatusChanged {
                old_status: OrderStatus::PendingPayment,
                new_status: OrderStatus::Paid,
                ..
            }
        ));
    assert!(paid_edge);
}

#[tokio::test]
async fn payment_amount_mismatch_rolls_everything_back() {
    let (db, capture) = memory_db().await;
    let product_id = seed_product(&db, "OIL-200", 2500, 10).await;
    seed_percentage_coupon(&db, "SAVE10", 1000, Some(5), 0).await;
    seed_tax_rate(&db, "US", 700).await;

    // gateway confirms 10000 but the order costs 10130
    let err = db
        .checkout()
        .place_order(request(&product_id, 4, Some("SAVE10"), 10_000))
        .await
        .unwrap_err();
    match err {
        DbError::Domain(CoreError::PaymentAmountMismatch { expected, received }) => {
            assert_eq!(expected.minor(), 10_130);
            assert_eq!(received.minor(), 10_000);
        }
        other => panic!("unexpected error: {other}"),
    }

    // nothing moved
    assert_eq!(db.inventory().stock_level(&product_id).await.unwrap(), 10);
    let coupon = db.coupons().find_by_code("SAVE10").await.unwrap().unwrap();
    assert_eq!(coupon.uses_count, 0);
    let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(orders, 0);
    assert!(capture.kinds().is_empty());
}

#[tokio::test]
async fn out_of_stock_cart_is_refused_before_payment_is_checked() {
    let (db, capture) = memory_db().await;
    let product_id = seed_product(&db, "OIL-250", 2500, 2).await;
    seed_tax_rate(&db, "US", 700).await;

    // five units against a stock of two, and a deliberately wrong amount:
    // the stock check must fire first
    let err = db
        .checkout()
        .place_order(request(&product_id, 5, None, 1))
        .await
        .unwrap_err();
    match err {
        DbError::Domain(CoreError::InsufficientStock {
            available,
            requested,
            ..
        }) => {
            assert_eq!(available, 2);
            assert_eq!(requested, 5);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(db.inventory().stock_level(&product_id).await.unwrap(), 2);
    let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(orders, 0);
    assert!(capture.kinds().is_empty());
}

#[tokio::test]
async fn failed_charge_is_rejected_before_the_transaction() {
    let (db, _) = memory_db().await;
    let product_id = seed_product(&db, "OIL-300", 2500, 10).await;
    seed_tax_rate(&db, "US", 700).await;

    let mut req = request(&product_id, 1, None, 3_175);
    req.payment.succeeded = false;
    let err = db.checkout().place_order(req).await.unwrap_err();
    assert!(matches!(err, DbError::Domain(CoreError::PaymentFailed(_))));
    assert_eq!(db.inventory().stock_level(&product_id).await.unwrap(), 10);
}

#[tokio::test]
async fn exhausted_coupon_is_rejected_with_the_usage_reason() {
    let (db, _) = memory_db().await;
    let product_id = seed_product(&db, "OIL-400", 2500, 10).await;
    seed_percentage_coupon(&db, "ONCE", 1000, Some(1), 1).await;
    seed_tax_rate(&db, "US", 700).await;

    let err = db
        .checkout()
        .place_order(request(&product_id, 4, Some("ONCE"), 10_130))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::Domain(CoreError::Coupon(CouponRejection::UsageLimitReached(_)))
    ));
    assert_eq!(db.inventory().stock_level(&product_id).await.unwrap(), 10);
}

#[tokio::test]
async fn unknown_coupon_is_rejected_as_not_found() {
    let (db, _) = memory_db().await;
    let product_id = seed_product(&db, "OIL-500", 2500, 10).await;
    seed_tax_rate(&db, "US", 700).await;

    let err = db
        .checkout()
        .place_order(request(&product_id, 1, Some("NOPE"), 3_175))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::Domain(CoreError::Coupon(CouponRejection::NotFound(_)))
    ));
}

#[tokio::test]
async fn empty_cart_never_opens_a_transaction() {
    let (db, _) = memory_db().await;
    let mut req = request("no-product", 1, None, 0);
    req.cart = CartSnapshot::new(vec![]);
    let err = db.checkout().place_order(req).await.unwrap_err();
    assert!(matches!(err, DbError::Domain(CoreError::EmptyCart)));
}

#[tokio::test]
async fn guest_checkout_without_coupon() {
    let (db, _) = memory_db().await;
    let product_id = seed_product(&db, "OIL-600", 2500, 10).await;
    seed_tax_rate(&db, "US", 700).await;

    // subtotal 2500, no discount, tax 175, shipping 500 -> 3175
    let mut req = request(&product_id, 1, None, 3_175);
    req.customer = Customer::Guest {
        email: "guest@example.com".to_string(),
    };
    let outcome = db.checkout().place_order(req).await.unwrap();
    assert_eq!(outcome.order.total_minor, 3_175);
    assert_eq!(outcome.order.guest_email.as_deref(), Some("guest@example.com"));
    assert!(outcome.order.user_id.is_none());
}

// =============================================================================
// Order lifecycle
// =============================================================================

#[tokio::test]
async fn order_walks_the_state_machine_to_completed() {
    let (db, capture) = memory_db().await;
    let product_id = seed_product(&db, "OIL-700", 2500, 10).await;
    seed_tax_rate(&db, "US", 700).await;

    let outcome = db
        .checkout()
        .place_order(request(&product_id, 1, None, 3_175))
        .await
        .unwrap();
    let order_id = outcome.order.id.clone();
    let orders = db.orders();

    // skipping straight to delivered is refused
    let err = orders
        .update_status(&order_id, OrderStatus::Delivered, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::Domain(CoreError::InvalidTransition { .. })
    ));

    orders.update_status(&order_id, OrderStatus::Processing, None).await.unwrap();

    // shipping without tracking details is refused
    let err = orders
        .update_status(&order_id, OrderStatus::Shipped, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));

    let shipped = orders
        .update_status(
            &order_id,
            OrderStatus::Shipped,
            Some(ShipmentInfo {
                tracking_number: "1Z999AA10123456784".to_string(),
                carrier: "UPS".to_string(),
            }),
        )
        .await
        .unwrap();
    assert_eq!(shipped.tracking_number.as_deref(), Some("1Z999AA10123456784"));

    orders.update_status(&order_id, OrderStatus::Delivered, None).await.unwrap();
    let done = orders
        .update_status(&order_id, OrderStatus::Completed, None)
        .await
        .unwrap();
    assert_eq!(done.status, OrderStatus::Completed);

    // one pending_payment -> paid edge from checkout, four from the
    // status updates above
    let status_changes = capture
        .kinds()
        .iter()
        .filter(|k| **k == "order.status_changed")
        .count();
    assert_eq!(status_changes, 5);
}
