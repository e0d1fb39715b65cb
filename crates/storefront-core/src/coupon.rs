//! # Coupon Validation
//!
//! Pure eligibility checks and discount arithmetic for coupons. The storage
//! layer looks the coupon row up and counts per-user redemptions; everything
//! decided here is decided from those inputs alone.
//!
//! ## Rejection Order
//!
//! When several rules fail at once, the customer sees exactly one reason,
//! always the same one. Checks run in this fixed order:
//!
//! 1. code matches no coupon
//! 2. inactive or outside its validity window (both read as expired)
//! 3. global usage cap reached
//! 4. fixed-amount currency differs from the cart currency
//! 5. minimum spend not met
//! 6. per-user redemption cap reached

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::CouponRejection;
use crate::money::MonetaryAmount;
use crate::types::{Coupon, CouponKind};

/// Checks whether `coupon` may be applied to a cart with the given
/// `subtotal`. `code` is what the customer typed; `None` for the coupon
/// means it matched no row. `user_redemptions` is how many orders this
/// customer already redeemed this coupon on; pass 0 for guests, who have
/// no redemption history to count.
///
/// This is a read-only check. Passing it does not reserve anything; the
/// usage counter is claimed atomically at order creation and a concurrent
/// redeemer can still win the last slot.
pub fn check_coupon(
    code: &str,
    coupon: Option<&Coupon>,
    subtotal: MonetaryAmount,
    user_redemptions: i64,
    now: DateTime<Utc>,
) -> Result<(), CouponRejection> {
    let coupon = coupon.ok_or_else(|| CouponRejection::NotFound(code.to_string()))?;

    // is_live also covers the inactive flag: a deactivated coupon reads
    // as expired, not as unknown.
    if !coupon.is_live(now) {
        return Err(CouponRejection::Expired(coupon.code.clone()));
    }
    if coupon.usage_exhausted() {
        return Err(CouponRejection::UsageLimitReached(coupon.code.clone()));
    }

    // Fixed-amount discounts only make sense in their own currency.
    if coupon.kind == CouponKind::FixedAmount {
        match coupon.currency_code.as_deref() {
            Some(code) if code == subtotal.currency().code() => {}
            _ => return Err(CouponRejection::CurrencyMismatch(coupon.code.clone())),
        }
    }

    if let Some(min_minor) = coupon.min_purchase_minor {
        let min_currency = coupon
            .min_purchase_currency
            .as_deref()
            .unwrap_or(subtotal.currency().code());
        if min_currency != subtotal.currency().code() {
            return Err(CouponRejection::CurrencyMismatch(coupon.code.clone()));
        }
        if subtotal.minor() < min_minor {
            let minimum = MonetaryAmount::from_minor(min_minor, subtotal.currency());
            return Err(CouponRejection::MinimumSpendNotMet {
                code: coupon.code.clone(),
                minimum,
            });
        }
    }

    if let Some(per_user) = coupon.max_uses_per_user {
        if user_redemptions >= per_user {
            return Err(CouponRejection::PerUserLimitReached(coupon.code.clone()));
        }
    }

    debug!(code = %coupon.code, subtotal = %subtotal, "coupon eligible");
    Ok(())
}

/// Computes the discount a valid coupon grants on `subtotal`.
///
/// Percentage coupons take basis points of the subtotal with half-up
/// rounding; fixed-amount coupons grant their face value, capped at the
/// subtotal so the discount can never push an order negative.
pub fn calculate_discount(coupon: &Coupon, subtotal: MonetaryAmount) -> MonetaryAmount {
    match coupon.kind {
        CouponKind::Percentage => subtotal.apply_rate_bps(coupon.value.max(0) as u32),
        CouponKind::FixedAmount => {
            let face = MonetaryAmount::from_minor(coupon.value, subtotal.currency());
            if face.minor() > subtotal.minor() {
                subtotal
            } else {
                face
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;

    fn usd(minor: i64) -> MonetaryAmount {
        MonetaryAmount::from_minor(minor, Currency::Usd)
    }

    fn coupon(kind: CouponKind, value: i64) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: "c-1".to_string(),
            code: "SAVE10".to_string(),
            description: None,
            kind,
            value,
            currency_code: match kind {
                CouponKind::FixedAmount => Some("USD".to_string()),
                CouponKind::Percentage => None,
            },
            max_uses: None,
            uses_count: 0,
            max_uses_per_user: None,
            min_purchase_minor: None,
            min_purchase_currency: None,
            valid_from: None,
            valid_to: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn missing_coupon_is_not_found() {
        let err = check_coupon("NOPE", None, usd(1000), 0, Utc::now()).unwrap_err();
        assert_eq!(err, CouponRejection::NotFound("NOPE".to_string()));
    }

    #[test]
    fn inactive_coupon_reads_as_expired() {
        let mut c = coupon(CouponKind::Percentage, 1000);
        c.is_active = false;
        let err = check_coupon("SAVE10", Some(&c), usd(1000), 0, Utc::now()).unwrap_err();
        assert_eq!(err, CouponRejection::Expired("SAVE10".to_string()));
    }

    #[test]
    fn expired_coupon_is_rejected() {
        let mut c = coupon(CouponKind::Percentage, 1000);
        c.valid_to = Some(Utc::now() - chrono::Duration::days(1));
        let err = check_coupon("SAVE10", Some(&c), usd(1000), 0, Utc::now()).unwrap_err();
        assert_eq!(err, CouponRejection::Expired("SAVE10".to_string()));
    }

    #[test]
    fn usage_cap_beats_later_checks() {
        // exhausted AND below minimum spend: the customer sees the cap
        let mut c = coupon(CouponKind::Percentage, 1000);
        c.max_uses = Some(1);
        c.uses_count = 1;
        c.min_purchase_minor = Some(5_000);
        let err = check_coupon("SAVE10", Some(&c), usd(1000), 0, Utc::now()).unwrap_err();
        assert_eq!(err, CouponRejection::UsageLimitReached("SAVE10".to_string()));
    }

    #[test]
    fn fixed_coupon_rejects_foreign_cart() {
        let c = coupon(CouponKind::FixedAmount, 500);
        let eur = MonetaryAmount::from_minor(10_000, Currency::Eur);
        let err = check_coupon("SAVE10", Some(&c), eur, 0, Utc::now()).unwrap_err();
        assert_eq!(err, CouponRejection::CurrencyMismatch("SAVE10".to_string()));
    }

    #[test]
    fn minimum_spend_carries_the_threshold() {
        let mut c = coupon(CouponKind::Percentage, 1000);
        c.min_purchase_minor = Some(5_000);
        let err = check_coupon("SAVE10", Some(&c), usd(4_999), 0, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            CouponRejection::MinimumSpendNotMet {
                code: "SAVE10".to_string(),
                minimum: usd(5_000),
            }
        );
        check_coupon("SAVE10", Some(&c), usd(5_000), 0, Utc::now()).unwrap();
    }

    #[test]
    fn per_user_cap_applies_last() {
        let mut c = coupon(CouponKind::Percentage, 1000);
        c.max_uses_per_user = Some(2);
        let err = check_coupon("SAVE10", Some(&c), usd(1000), 2, Utc::now()).unwrap_err();
        assert_eq!(err, CouponRejection::PerUserLimitReached("SAVE10".to_string()));
        check_coupon("SAVE10", Some(&c), usd(1000), 1, Utc::now()).unwrap();
    }

    #[test]
    fn percentage_discount_rounds_half_up() {
        let c = coupon(CouponKind::Percentage, 1000);
        assert_eq!(calculate_discount(&c, usd(10_000)).minor(), 1_000);
        // 10% of 10.05 = 1.005 -> 1.01
        assert_eq!(calculate_discount(&c, usd(1_005)).minor(), 101);
    }

    #[test]
    fn fixed_discount_caps_at_subtotal() {
        let c = coupon(CouponKind::FixedAmount, 2_000);
        assert_eq!(calculate_discount(&c, usd(10_000)).minor(), 2_000);
        assert_eq!(calculate_discount(&c, usd(1_500)).minor(), 1_500);
    }
}
