//! # Tax Rate Repository
//!
//! Loads candidate tax rates for an address. Matching and compounding are
//! pure logic in `storefront_core::tax`; the query here only narrows by
//! country to keep the candidate set small.

use sqlx::SqlitePool;
use tracing::debug;

use storefront_core::validation::validate_country_code;
use storefront_core::{Address, CoreError, TaxRate};

use crate::error::DbResult;

/// Repository for tax rate lookups.
#[derive(Debug, Clone)]
pub struct TaxRateRepository {
    pool: SqlitePool,
}

impl TaxRateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TaxRateRepository { pool }
    }

    /// Active rates for the address's country, priority ascending. The
    /// caller filters further with `storefront_core::tax::applicable_rates`.
    pub async fn rates_for(&self, address: &Address) -> DbResult<Vec<TaxRate>> {
        validate_country_code(&address.country_code).map_err(CoreError::from)?;

        let rates = sqlx::query_as::<_, TaxRate>(
            r#"
            SELECT * FROM tax_rates
             WHERE is_active = 1
               AND UPPER(country_code) = UPPER(?)
             ORDER BY priority ASC
            "#,
        )
        .bind(&address.country_code)
        .fetch_all(&self.pool)
        .await?;

        debug!(
            country = %address.country_code,
            candidates = rates.len(),
            "Tax rate candidates loaded"
        );
        Ok(rates)
    }
}
