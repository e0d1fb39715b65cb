//! # Coupon Repository
//!
//! Coupon lookup and the atomic usage-counter claim. Eligibility rules
//! live in `storefront_core::coupon`; this module supplies the inputs and
//! performs the guarded increment.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use storefront_core::validation::validate_coupon_code;
use storefront_core::{CoreError, Coupon, CouponRejection};

use crate::error::{DbError, DbResult};

/// Claims one use of a coupon on an open connection/transaction.
///
/// The guard mirrors the stock guard: the increment only lands while the
/// cap still has room, evaluated under the write lock. Zero rows means a
/// concurrent redeemer took the last slot after our eligibility check.
pub(crate) async fn apply_redemption(
    conn: &mut SqliteConnection,
    coupon_id: &str,
    code: &str,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE coupons
           SET uses_count = uses_count + 1,
               updated_at = ?
         WHERE id = ?
           AND is_active = 1
           AND (max_uses IS NULL OR uses_count < max_uses)
        "#,
    )
    .bind(Utc::now())
    .bind(coupon_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::Domain(CoreError::Coupon(
            CouponRejection::UsageLimitReached(code.to_string()),
        )));
    }
    debug!(coupon_id = %coupon_id, "Coupon use claimed");
    Ok(())
}

/// Repository for coupon operations.
#[derive(Debug, Clone)]
pub struct CouponRepository {
    pool: SqlitePool,
}

impl CouponRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CouponRepository { pool }
    }

    /// Looks a coupon up by code. Codes are stored uppercase; lookups
    /// normalize. `Ok(None)` means no such code, which the validator
    /// turns into `CouponRejection::NotFound`.
    pub async fn find_by_code(&self, code: &str) -> DbResult<Option<Coupon>> {
        let normalized = code.trim().to_uppercase();
        validate_coupon_code(&normalized).map_err(CoreError::from)?;

        let coupon = sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE code = ?")
            .bind(&normalized)
            .fetch_optional(&self.pool)
            .await?;
        Ok(coupon)
    }

    /// How many non-cancelled orders `user_id` has already redeemed this
    /// coupon on. Guests have no order history to count against.
    pub async fn redemption_count_for_user(
        &self,
        coupon_id: &str,
        user_id: &str,
    ) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM orders
             WHERE coupon_id = ?
               AND user_id = ?
               AND status NOT IN ('cancelled', 'refunded')
            "#,
        )
        .bind(coupon_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Standalone atomic redemption, for flows outside checkout (e.g.
    /// manual order entry). Checkout claims inside its own transaction
    /// via the same guarded statement.
    pub async fn redeem(&self, coupon: &Coupon) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        apply_redemption(&mut tx, &coupon.id, &coupon.code).await?;
        tx.commit().await?;
        info!(code = %coupon.code, "Coupon redeemed");
        Ok(())
    }
}
