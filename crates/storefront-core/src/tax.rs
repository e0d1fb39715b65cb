//! # Tax Resolution
//!
//! Selects the tax rates applicable to a shipping address and applies them
//! to a taxable base in priority order.
//!
//! A rate matches an address when its country code matches and its state
//! code is either unset (whole-country rate) or equal to the address
//! state. Compound rates apply to the base plus the tax accumulated so
//! far, which is how provinces layer a regional tax on top of a national
//! one. No matching rate means zero tax, not an error.

use chrono::NaiveDate;
use tracing::debug;

use crate::money::MonetaryAmount;
use crate::types::{Address, TaxRate};

/// The outcome of a tax calculation: the grand total plus the per-rate
/// breakdown, for receipts and audit.
#[derive(Debug, Clone)]
pub struct TaxBreakdown {
    pub total: MonetaryAmount,
    pub lines: Vec<TaxLine>,
}

/// One applied rate inside a [`TaxBreakdown`].
#[derive(Debug, Clone)]
pub struct TaxLine {
    pub rate_id: String,
    pub name: String,
    pub rate_bps: u32,
    pub is_compound: bool,
    pub amount: MonetaryAmount,
}

/// Filters `rates` down to those matching `address` on `date`, ordered by
/// ascending priority. Ties keep their input order.
pub fn applicable_rates<'a>(
    rates: &'a [TaxRate],
    address: &Address,
    date: NaiveDate,
) -> Vec<&'a TaxRate> {
    let mut matched: Vec<&TaxRate> = rates
        .iter()
        .filter(|r| r.is_active)
        .filter(|r| r.country_code.eq_ignore_ascii_case(&address.country_code))
        .filter(|r| match (&r.state_code, &address.state) {
            (None, _) => true,
            (Some(rate_state), Some(addr_state)) => {
                rate_state.eq_ignore_ascii_case(addr_state)
            }
            (Some(_), None) => false,
        })
        .filter(|r| r.valid_from.map_or(true, |from| date >= from))
        .filter(|r| r.valid_to.map_or(true, |to| date <= to))
        .collect();
    matched.sort_by_key(|r| r.priority);
    matched
}

/// Applies `rates` (already filtered and ordered, see [`applicable_rates`])
/// to `base`. Simple rates take basis points of the base; compound rates
/// take basis points of the base plus all tax accumulated before them.
/// Each line rounds half-up independently.
pub fn calculate_tax(rates: &[&TaxRate], base: MonetaryAmount) -> TaxBreakdown {
    let mut total = MonetaryAmount::zero(base.currency());
    let mut lines = Vec::with_capacity(rates.len());

    for rate in rates {
        let taxable = if rate.is_compound {
            // same-currency by construction, the sum cannot fail
            MonetaryAmount::from_minor(base.minor() + total.minor(), base.currency())
        } else {
            base
        };
        let amount = taxable.apply_rate_bps(rate.rate_bps);
        total = MonetaryAmount::from_minor(total.minor() + amount.minor(), base.currency());
        lines.push(TaxLine {
            rate_id: rate.id.clone(),
            name: rate.name.clone(),
            rate_bps: rate.rate_bps,
            is_compound: rate.is_compound,
            amount,
        });
    }

    debug!(base = %base, tax = %total, rates = lines.len(), "tax calculated");
    TaxBreakdown { total, lines }
}

// =============================================================================
// Unit Tests
// =============================================================================
