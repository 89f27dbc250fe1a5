//! Money Validation Module
//!
//! Every amount that enters the ledger passes through this module before it
//! touches a wallet. Balances and amounts are `NUMERIC(12, 2)` in PostgreSQL,
//! so the ledger works with `rust_decimal::Decimal` end to end and rejects
//! anything that would be silently rounded by the store.
//!
//! ## Rules
//! 1. Amounts are strictly positive
//! 2. At most [`AMOUNT_DECIMALS`] fractional digits (no silent truncation)
//! 3. At most [`MAX_AMOUNT`]
//! 4. String input must be plain decimal notation (`0.5`, not `.5`, `5.`, `5e1`)

use rust_decimal::prelude::*;
use thiserror::Error;

/// Fractional digits of every monetary column
pub const AMOUNT_DECIMALS: u32 = 2;

/// Largest value a `NUMERIC(12, 2)` column can hold
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2); // 9_999_999_999.99

// ============================================================================
// Error Types
// ============================================================================

/// Amount validation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Amount too large")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    InvalidFormat(String),
}

// ============================================================================
// Validation
// ============================================================================

/// Validate an already-parsed amount.
///
/// Returns the amount normalized to its minimal scale.
pub fn validate_amount(amount: Decimal) -> Result<Decimal, MoneyError> {
    if amount <= Decimal::ZERO {
        return Err(MoneyError::InvalidAmount);
    }

    let normalized = amount.normalize();
    if normalized.scale() > AMOUNT_DECIMALS {
        return Err(MoneyError::PrecisionOverflow {
            provided: normalized.scale(),
            max: AMOUNT_DECIMALS,
        });
    }

    if normalized > MAX_AMOUNT {
        return Err(MoneyError::Overflow);
    }

    Ok(normalized)
}

/// Parse a client-supplied amount string and validate it.
///
/// # Errors
/// * `InvalidFormat` - empty, signed, `.5`, `5.`, scientific notation, garbage
/// * `PrecisionOverflow` - more than two decimal places
/// * `InvalidAmount` - zero
/// * `Overflow` - does not fit the ledger columns
pub fn parse_amount(amount_str: &str) -> Result<Decimal, MoneyError> {
    let s = amount_str.trim();
    if s.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }

    if s.starts_with('+') || s.starts_with('-') {
        return Err(MoneyError::InvalidFormat("sign not allowed".into()));
    }

    if s.starts_with('.') {
        return Err(MoneyError::InvalidFormat(
            "missing leading zero (e.g., use 0.5 instead of .5)".into(),
        ));
    }

    if s.ends_with('.') {
        return Err(MoneyError::InvalidFormat(
            "missing fractional part (e.g., use 5.0 instead of 5.)".into(),
        ));
    }

    if !s.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(MoneyError::InvalidFormat(format!("invalid characters in {}", s)));
    }

    let d = Decimal::from_str(s).map_err(|e| MoneyError::InvalidFormat(e.to_string()))?;
    validate_amount(d)
}

/// Read an amount out of a loosely-typed JSON payload.
///
/// Bank and ATM webhooks send either `"75.00"` or `75`; both are accepted,
/// floats are routed through their shortest string form so `0.1` stays `0.1`.
pub fn amount_from_json(value: &serde_json::Value) -> Result<Decimal, MoneyError> {
    match value {
        serde_json::Value::String(s) => parse_amount(s),
        serde_json::Value::Number(n) => {
            let s = n.to_string();
            if s.contains('e') || s.contains('E') {
                return Err(MoneyError::InvalidFormat(
                    "scientific notation not allowed".into(),
                ));
            }
            if s.starts_with('-') {
                return Err(MoneyError::InvalidAmount);
            }
            parse_amount(&s)
        }
        serde_json::Value::Null => Err(MoneyError::InvalidFormat("amount is required".into())),
        _ => Err(MoneyError::InvalidFormat("amount must be a number".into())),
    }
}
