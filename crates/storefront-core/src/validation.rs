//! # Input Validation
//!
//! Field-level checks applied at the edges, before anything touches the
//! database. Each function validates one field and returns the first
//! problem it finds.

use crate::error::ValidationError;

/// SKU: required, at most 64 chars, alphanumeric plus `-` and `_`.
pub fn validate_sku(sku: &str) -> Result<(), ValidationError> {
    if sku.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }
    if sku.len() > 64 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 64,
        });
    }
    if !sku
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "only letters, digits, '-' and '_' are allowed".to_string(),
        });
    }
    Ok(())
}

/// Coupon code: required, at most 32 chars, uppercase alphanumeric plus
/// `-`. Codes are stored and matched uppercase.
pub fn validate_coupon_code(code: &str) -> Result<(), ValidationError> {
    if code.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "coupon_code".to_string(),
        });
    }
    if code.len() > 32 {
        return Err(ValidationError::TooLong {
            field: "coupon_code".to_string(),
            max: 32,
        });
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(ValidationError::InvalidFormat {
            field: "coupon_code".to_string(),
            reason: "only uppercase letters, digits and '-' are allowed".to_string(),
        });
    }
    Ok(())
}

/// Order line quantity: strictly positive.
pub fn validate_quantity(quantity: i64) -> Result<(), ValidationError> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    Ok(())
}

/// Currency code: exactly three ASCII letters (ISO 4217). Whether the
/// code is a recognized currency is `Currency::from_str`'s job; this only
/// vets the shape at the input edge.
pub fn validate_currency_code(code: &str) -> Result<(), ValidationError> {
    if code.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "currency_code".to_string(),
        });
    }
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidFormat {
            field: "currency_code".to_string(),
            reason: "expected a three-letter ISO 4217 code".to_string(),
        });
    }
    Ok(())
}

/// Country code: exactly two ASCII letters (ISO 3166-1 alpha-2).
pub fn validate_country_code(code: &str) -> Result<(), ValidationError> {
    if code.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "country_code".to_string(),
        });
    }
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidFormat {
            field: "country_code".to_string(),
            reason: "expected a two-letter ISO 3166-1 code".to_string(),
        });
    }
    Ok(())
}
