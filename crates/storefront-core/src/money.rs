//! # Money Module
//!
//! Currency-tagged monetary values in integer minor units.
//!
//! ## Why Integer Minor Units?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  In floating point:  0.1 + 0.2 = 0.30000000000000004   ❌           │
//! │                                                                     │
//! │  Here: 10 + 20 = 30 minor units, exactly.                           │
//! │  Where precision is lost (rates, percentages) it is lost            │
//! │  explicitly, with documented half-up rounding.                      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Why a Currency Tag?
//! Every binary operation (add, subtract, compare) requires both operands
//! to share a currency and fails with [`CoreError::CurrencyMismatch`]
//! otherwise. There is no silent coercion anywhere in the crate.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};

// =============================================================================
// Currency
// =============================================================================

/// Recognized ISO 4217 currencies.
///
/// Each currency carries its ISO exponent: the number of minor-unit digits
/// (`USD` has 2, `JPY` has 0, `KWD` has 3). Arithmetic never touches the
/// exponent; it only matters when converting to and from decimal strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Jpy,
    Cad,
    Aud,
    Chf,
    Sek,
    Nok,
    Dkk,
    Pln,
    Inr,
    Sgd,
    Hkd,
    Nzd,
    Kwd,
}

/// Currency assumed when a caller supplies none.
pub const DEFAULT_CURRENCY: Currency = Currency::Usd;

impl Currency {
    /// The three-letter ISO 4217 code.
    pub const fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Jpy => "JPY",
            Currency::Cad => "CAD",
            Currency::Aud => "AUD",
            Currency::Chf => "CHF",
            Currency::Sek => "SEK",
            Currency::Nok => "NOK",
            Currency::Dkk => "DKK",
            Currency::Pln => "PLN",
            Currency::Inr => "INR",
            Currency::Sgd => "SGD",
            Currency::Hkd => "HKD",
            Currency::Nzd => "NZD",
            Currency::Kwd => "KWD",
        }
    }

    /// Number of minor-unit digits for this currency.
    pub const fn exponent(&self) -> u32 {
        match self {
            Currency::Jpy => 0,
            Currency::Kwd => 3,
            _ => 2,
        }
    }
}

impl FromStr for Currency {
    type Err = CoreError;

    /// Parses a three-letter code, case-insensitively.
    /// Fails with [`CoreError::InvalidCurrency`] for anything unrecognized.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "GBP" => Ok(Currency::Gbp),
            "JPY" => Ok(Currency::Jpy),
            "CAD" => Ok(Currency::Cad),
            "AUD" => Ok(Currency::Aud),
            "CHF" => Ok(Currency::Chf),
            "SEK" => Ok(Currency::Sek),
            "NOK" => Ok(Currency::Nok),
            "DKK" => Ok(Currency::Dkk),
            "PLN" => Ok(Currency::Pln),
            "INR" => Ok(Currency::Inr),
            "SGD" => Ok(Currency::Sgd),
            "HKD" => Ok(Currency::Hkd),
            "NZD" => Ok(Currency::Nzd),
            "KWD" => Ok(Currency::Kwd),
            other => Err(CoreError::InvalidCurrency(other.to_string())),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// =============================================================================
// MonetaryAmount
// =============================================================================

/// An immutable monetary value: integer minor units tagged with a currency.
///
/// Every operation returns a new value. Binary operations across differing
/// currencies fail rather than coerce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonetaryAmount {
    minor: i64,
    currency: Currency,
}

impl MonetaryAmount {
    /// Creates an amount from minor units (cents for USD).
    #[inline]
    pub const fn from_minor(minor: i64, currency: Currency) -> Self {
        MonetaryAmount { minor, currency }
    }

    /// Zero in the given currency.
    #[inline]
    pub const fn zero(currency: Currency) -> Self {
        MonetaryAmount { minor: 0, currency }
    }

    /// Parses a decimal string ("10.99") into minor units using the
    /// currency's exponent. Excess fractional digits round half-up.
    ///
    /// ## Example
    /// ```rust
    /// use storefront_core::money::{Currency, MonetaryAmount};
    ///
    /// let a = MonetaryAmount::from_decimal("10.99", Currency::Usd).unwrap();
    /// assert_eq!(a.minor(), 1099);
    ///
    /// let b = MonetaryAmount::from_decimal("500", Currency::Jpy).unwrap();
    /// assert_eq!(b.minor(), 500);
    /// ```
    pub fn from_decimal(text: &str, currency: Currency) -> CoreResult<Self> {
        let invalid = |reason: &str| {
            CoreError::Validation(ValidationError::InvalidFormat {
                field: "amount".to_string(),
                reason: reason.to_string(),
            })
        };

        let text = text.trim();
        let (negative, unsigned) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let (int_part, frac_part) = match unsigned.split_once('.') {
            Some((i, f)) => (i, f),
            None => (unsigned, ""),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid("empty amount"));
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid("expected a plain decimal number"));
        }

        let exponent = currency.exponent() as usize;
        let whole: i128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid("integer part out of range"))?
        };

        let scaled_whole = whole
            .checked_mul(10i128.pow(exponent as u32))
            .ok_or_else(|| invalid("amount out of range"))?;

        // Fractional digits up to the exponent contribute directly; the first
        // digit past it decides half-up rounding of the rest.
        let frac = frac_part.as_bytes();
        let mut frac_minor: i128 = 0;
        for i in 0..exponent {
            let digit = frac.get(i).map(|b| (b - b'0') as i128).unwrap_or(0);
            frac_minor = frac_minor * 10 + digit;
        }
        if frac.len() > exponent && frac[exponent] >= b'5' {
            frac_minor += 1;
        }
        let mut minor = scaled_whole + frac_minor;

        if negative {
            minor = -minor;
        }

        let minor: i64 = minor
            .try_into()
            .map_err(|_| invalid("amount out of range"))?;
        Ok(MonetaryAmount { minor, currency })
    }

    /// The value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.minor
    }

    /// The currency tag.
    #[inline]
    pub const fn currency(&self) -> Currency {
        self.currency
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.minor == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.minor < 0
    }

    /// Adds two amounts. Fails with `CurrencyMismatch` if the currencies
    /// differ.
    pub fn add(&self, other: MonetaryAmount) -> CoreResult<MonetaryAmount> {
        self.require_same_currency(&other)?;
        Ok(MonetaryAmount {
            minor: self.minor + other.minor,
            currency: self.currency,
        })
    }

    /// Subtracts `other` from `self`. Fails with `CurrencyMismatch` if the
    /// currencies differ.
    pub fn subtract(&self, other: MonetaryAmount) -> CoreResult<MonetaryAmount> {
        self.require_same_currency(&other)?;
        Ok(MonetaryAmount {
            minor: self.minor - other.minor,
            currency: self.currency,
        })
    }

    /// Multiplies by an integer scalar (line quantity). Exact.
    #[inline]
    pub const fn multiply_by(&self, scalar: i64) -> MonetaryAmount {
        MonetaryAmount {
            minor: self.minor * scalar,
            currency: self.currency,
        }
    }

    /// Applies a rate in basis points (1000 bps = 10%), rounding half-up to
    /// the nearest minor unit.
    ///
    /// ## Rounding
    /// Integer math with a carry: `(minor * bps + 5000) / 10000`. i128
    /// widening prevents overflow on large amounts. Commercial half-up was
    /// chosen over banker's rounding for predictability; a 0.5-minor-unit
    /// fraction always rounds away from zero for the non-negative amounts
    /// this crate computes rates on.
    ///
    /// ## Example
    /// ```rust
    /// use storefront_core::money::{Currency, MonetaryAmount};
    ///
    /// let subtotal = MonetaryAmount::from_minor(1000, Currency::Usd);
    /// // 8.25% of $10.00 = $0.825, rounds to $0.83
    /// assert_eq!(subtotal.apply_rate_bps(825).minor(), 83);
    /// ```
    pub fn apply_rate_bps(&self, bps: u32) -> MonetaryAmount {
        let scaled = (self.minor as i128 * bps as i128 + 5000) / 10000;
        MonetaryAmount {
            minor: scaled as i64,
            currency: self.currency,
        }
    }

    /// Compares two amounts. Fails with `CurrencyMismatch` if the currencies
    /// differ; ordering across currencies is meaningless.
    pub fn compare(&self, other: MonetaryAmount) -> CoreResult<Ordering> {
        self.require_same_currency(&other)?;
        Ok(self.minor.cmp(&other.minor))
    }

    /// Renders the amount as a plain decimal string using the currency's
    /// exponent: `1099` USD -> `"10.99"`, `500` JPY -> `"500"`.
    pub fn to_decimal_string(&self) -> String {
        let exponent = self.currency.exponent();
        if exponent == 0 {
            return self.minor.to_string();
        }
        let scale = 10u64.pow(exponent);
        let sign = if self.minor < 0 { "-" } else { "" };
        let abs = self.minor.unsigned_abs();
        format!(
            "{}{}.{:0width$}",
            sign,
            abs / scale,
            abs % scale,
            width = exponent as usize
        )
    }

    fn require_same_currency(&self, other: &MonetaryAmount) -> CoreResult<()> {
        if self.currency != other.currency {
            return Err(CoreError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            });
        }
        Ok(())
    }
}

/// Ordering is only defined within one currency; across currencies the
/// comparison yields `None`.
impl PartialOrd for MonetaryAmount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.currency != other.currency {
            return None;
        }
        Some(self.minor.cmp(&other.minor))
    }
}

/// Debug-friendly display: decimal value followed by the currency code.
impl fmt::Display for MonetaryAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_decimal_string(), self.currency.code())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
