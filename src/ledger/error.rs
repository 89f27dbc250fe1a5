//! Ledger Error Types
//!
//! One taxonomy for every core operation. Each variant has a stable
//! `code()` for callers and an HTTP status suggestion for the gateway.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::core_types::{CurrencyCode, TierId, WalletId};
use crate::money::MoneyError;

use super::limits::LimitKind;

/// Ledger error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    // === Validation Errors (nothing has been mutated) ===
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Wallet not found: {0}")]
    WalletNotFound(WalletId),

    #[error("Cannot transfer to the same wallet")]
    SameWallet,

    #[error("Source and target wallets must have the same currency")]
    CurrencyMismatch,

    #[error("Wallet {0} is inactive")]
    InactiveWallet(WalletId),

    #[error("Wallet does not belong to the caller")]
    NotWalletOwner,

    // === Balance / Limit Errors ===
    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("{}", limit_exceeded_message(*.kind, .remaining, .currency))]
    LimitExceeded {
        kind: LimitKind,
        remaining: Decimal,
        currency: CurrencyCode,
    },

    #[error("No limit configured for tier {tier_id} and currency {currency}")]
    LimitConfigurationMissing {
        tier_id: TierId,
        currency: CurrencyCode,
    },

    // === Transfer Protocol Errors ===
    #[error("No pending transaction found with reference {0}")]
    NoPendingTransaction(String),

    #[error("Transfer {0} has expired")]
    TransferExpired(String),

    // === ATM Errors ===
    #[error("This ATM code has already been used")]
    AlreadyUsed,

    #[error("Invalid ATM code")]
    InvalidCredentials,

    // === Event Errors ===
    #[error("Invalid event type: {0}")]
    InvalidEventType(String),

    // === Wallet Lifecycle Errors ===
    #[error("User has reached the maximum number of wallets allowed for their tier")]
    WalletQuotaExceeded,

    #[error("Wallet is already inactive")]
    WalletAlreadyInactive,

    #[error("Wallet name already in use: {0}")]
    DuplicateWalletName(String),

    // === System Errors ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn limit_exceeded_message(kind: LimitKind, remaining: &Decimal, currency: &str) -> String {
    match kind {
        LimitKind::Transfer => format!(
            "Transfer limit exceeded. You can only transfer {} {} today.",
            remaining, currency
        ),
        LimitKind::Withdrawal => format!(
            "Withdrawal limit exceeded. You can only withdraw {} {} today.",
            remaining, currency
        ),
        LimitKind::TransactionCount => format!(
            "Daily transaction limit exceeded. You can only make {} more {} transactions today.",
            remaining, currency
        ),
    }
}

impl LedgerError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "VALIDATION_ERROR",
            LedgerError::WalletNotFound(_) => "WALLET_NOT_FOUND",
            LedgerError::SameWallet => "SAME_WALLET",
            LedgerError::CurrencyMismatch => "CURRENCY_MISMATCH",
            LedgerError::InactiveWallet(_) => "INACTIVE_WALLET",
            LedgerError::NotWalletOwner => "NOT_WALLET_OWNER",
            LedgerError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            LedgerError::LimitExceeded { .. } => "LIMIT_EXCEEDED",
            LedgerError::LimitConfigurationMissing { .. } => "LIMIT_CONFIGURATION_MISSING",
            LedgerError::NoPendingTransaction(_) => "NO_PENDING_TRANSACTION",
            LedgerError::TransferExpired(_) => "TRANSFER_EXPIRED",
            LedgerError::AlreadyUsed => "ALREADY_USED",
            LedgerError::InvalidCredentials => "INVALID_CREDENTIALS",
            LedgerError::InvalidEventType(_) => "INVALID_EVENT_TYPE",
            LedgerError::WalletQuotaExceeded => "WALLET_QUOTA_EXCEEDED",
            LedgerError::WalletAlreadyInactive => "WALLET_ALREADY_INACTIVE",
            LedgerError::DuplicateWalletName(_) => "DUPLICATE_WALLET_NAME",
            LedgerError::Database(_) => "DATABASE_ERROR",
            LedgerError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::Validation(_)
            | LedgerError::SameWallet
            | LedgerError::CurrencyMismatch
            | LedgerError::InvalidEventType(_)
            | LedgerError::DuplicateWalletName(_) => 400,
            LedgerError::InvalidCredentials => 401,
            LedgerError::NotWalletOwner => 403,
            LedgerError::WalletNotFound(_) | LedgerError::NoPendingTransaction(_) => 404,
            LedgerError::AlreadyUsed => 409,
            LedgerError::InactiveWallet(_)
            | LedgerError::InsufficientBalance
            | LedgerError::LimitExceeded { .. }
            | LedgerError::TransferExpired(_)
            | LedgerError::WalletQuotaExceeded
            | LedgerError::WalletAlreadyInactive => 422,
            LedgerError::LimitConfigurationMissing { .. }
            | LedgerError::Database(_)
            | LedgerError::Internal(_) => 500,
        }
    }

    /// Faults whose detail must not reach an end user
    pub fn is_internal(&self) -> bool {
        matches!(self, LedgerError::Database(_) | LedgerError::Internal(_))
    }

    /// Message safe to show to the caller
    pub fn public_message(&self) -> String {
        if self.is_internal() {
            "Unexpected error occurred".to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Database(e.to_string())
    }
}

impl From<MoneyError> for LedgerError {
    fn from(e: MoneyError) -> Self {
        LedgerError::Validation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_error_codes() {
        assert_eq!(LedgerError::InsufficientBalance.code(), "INSUFFICIENT_BALANCE");
        assert_eq!(LedgerError::AlreadyUsed.code(), "ALREADY_USED");
        assert_eq!(
            LedgerError::NoPendingTransaction("R".into()).code(),
            "NO_PENDING_TRANSACTION"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(LedgerError::Validation("x".into()).http_status(), 400);
        assert_eq!(LedgerError::NotWalletOwner.http_status(), 403);
        assert_eq!(LedgerError::WalletNotFound(1).http_status(), 404);
        assert_eq!(LedgerError::InsufficientBalance.http_status(), 422);
        assert_eq!(LedgerError::Internal("boom".into()).http_status(), 500);
    }

    #[test]
    fn test_limit_exceeded_reports_exact_headroom() {
        let err = LedgerError::LimitExceeded {
            kind: LimitKind::Transfer,
            remaining: Decimal::from_str("100.00").unwrap(),
            currency: "USD".into(),
        };
        assert_eq!(
            err.to_string(),
            "Transfer limit exceeded. You can only transfer 100.00 USD today."
        );

        let err = LedgerError::LimitExceeded {
            kind: LimitKind::Withdrawal,
            remaining: Decimal::from(40),
            currency: "EGP".into(),
        };
        assert!(err.to_string().contains("withdraw 40 EGP"));
    }

    #[test]
    fn test_internal_detail_is_hidden() {
        let err = LedgerError::Database("connection reset by peer".into());
        assert_eq!(err.public_message(), "Unexpected error occurred");
        assert_eq!(
            LedgerError::InsufficientBalance.public_message(),
            "Insufficient balance"
        );
    }

    #[test]
    fn test_money_error_maps_to_validation() {
        let err: LedgerError = MoneyError::InvalidAmount.into();
        assert!(matches!(err, LedgerError::Validation(_)));
    }
}
