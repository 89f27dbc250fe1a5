//! Gateway request/response types
//!
//! - `ApiResponse<T>`: unified `{code, msg, data}` envelope
//! - `ApiError` / `ApiResult`: error side of every handler
//! - `StrictDecimal`: amount validated at the serde layer
//! - request and response DTOs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{Reference, WalletId};
use crate::ledger::error::LedgerError;
use crate::ledger::models::{AtmCode, Transaction, TransferLegs, Wallet};
use crate::money;

// ============================================================================
// StrictDecimal: Format-Validated Amount at Serde Layer
// ============================================================================

/// Amount validated during deserialization
///
/// Accepts a JSON string or number and applies the ledger's amount rules:
/// - Rejects `.5` (must be `0.5`) and `5.` (must be `5.0` or `5`)
/// - Rejects zero, negative numbers and scientific notation
/// - Rejects more than two decimal places
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrictDecimal(Decimal);

impl StrictDecimal {
    pub fn inner(self) -> Decimal {
        self.0
    }
}

impl<'de> Deserialize<'de> for StrictDecimal {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        let value = serde_json::Value::deserialize(deserializer)?;
        money::amount_from_json(&value)
            .map(StrictDecimal)
            .map_err(|e| D::Error::custom(e.to_string()))
    }
}

impl Serialize for StrictDecimal {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: actual data (success) or absent (error)
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: error_codes::SUCCESS,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

/// Standard API error codes
pub mod error_codes {
    // Success
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const INSUFFICIENT_BALANCE: i32 = 1002;
    pub const LIMIT_EXCEEDED: i32 = 1003;
    pub const INACTIVE_WALLET: i32 = 1004;
    pub const TRANSFER_EXPIRED: i32 = 1005;
    pub const WALLET_QUOTA_EXCEEDED: i32 = 1006;

    // Auth errors (2xxx)
    pub const MISSING_AUTH: i32 = 2001;
    pub const AUTH_FAILED: i32 = 2002;
    pub const FORBIDDEN: i32 = 2003;

    // Resource errors (4xxx)
    pub const WALLET_NOT_FOUND: i32 = 4001;
    pub const TRANSFER_NOT_FOUND: i32 = 4002;
    pub const CONFLICT: i32 = 4009;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
}

// ============================================================================
// ApiError / ApiResult
// ============================================================================

/// Error side of a handler: HTTP status plus envelope
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
}

pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::success(data))))
}

pub fn created<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::success(data))))
}

impl ApiError {
    pub fn new(status: StatusCode, code: i32, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_codes::INVALID_PARAMETER, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error_codes::AUTH_FAILED, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, error_codes::FORBIDDEN, msg)
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            error_codes::SERVICE_UNAVAILABLE,
            msg,
        )
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        if e.is_internal() {
            tracing::error!(error = %e, "Request failed with internal error");
        }
        let status = StatusCode::from_u16(e.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, envelope_code(&e), e.public_message())
    }
}

fn envelope_code(e: &LedgerError) -> i32 {
    use error_codes::*;
    match e {
        LedgerError::Validation(_)
        | LedgerError::SameWallet
        | LedgerError::CurrencyMismatch
        | LedgerError::InvalidEventType(_)
        | LedgerError::DuplicateWalletName(_) => INVALID_PARAMETER,
        LedgerError::InsufficientBalance => INSUFFICIENT_BALANCE,
        LedgerError::LimitExceeded { .. } => LIMIT_EXCEEDED,
        LedgerError::InactiveWallet(_) | LedgerError::WalletAlreadyInactive => INACTIVE_WALLET,
        LedgerError::TransferExpired(_) => TRANSFER_EXPIRED,
        LedgerError::WalletQuotaExceeded => WALLET_QUOTA_EXCEEDED,
        LedgerError::InvalidCredentials => AUTH_FAILED,
        LedgerError::NotWalletOwner => FORBIDDEN,
        LedgerError::WalletNotFound(_) => WALLET_NOT_FOUND,
        LedgerError::NoPendingTransaction(_) => TRANSFER_NOT_FOUND,
        LedgerError::AlreadyUsed => CONFLICT,
        LedgerError::LimitConfigurationMissing { .. }
        | LedgerError::Database(_)
        | LedgerError::Internal(_) => INTERNAL_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.code, self.msg))).into_response()
    }
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct InitiateTransferRequest {
    pub source_wallet_id: WalletId,
    pub target_wallet_id: WalletId,
    pub amount: StrictDecimal,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferActionRequest {
    pub action: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenWalletRequest {
    pub currency: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BankTransferRequest {
    pub amount: StrictDecimal,
}

// ============================================================================
// Response DTOs
// ============================================================================

/// One transfer as the parties see it
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TransferView {
    pub reference: Reference,
    pub status: String,
    pub source_wallet_id: WalletId,
    pub target_wallet_id: WalletId,
    pub amount: Decimal,
    pub description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<TransferLegs> for TransferView {
    fn from(legs: TransferLegs) -> Self {
        // Legs never diverge once committed; fall back to the out-leg.
        let status = legs.status().unwrap_or(legs.out_leg.status);
        Self {
            reference: legs.reference().clone(),
            status: status.as_str().to_string(),
            source_wallet_id: legs.source_wallet_id(),
            target_wallet_id: legs.target_wallet_id(),
            amount: legs.amount(),
            description: legs.out_leg.description,
            expires_at: legs.out_leg.expires_at,
            created_at: legs.out_leg.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct WalletView {
    pub id: WalletId,
    pub name: String,
    pub currency: String,
    pub balance: Decimal,
    pub transferred_today: Decimal,
    pub withdrawn_today: Decimal,
    pub is_active: bool,
}

impl From<Wallet> for WalletView {
    fn from(w: Wallet) -> Self {
        Self {
            id: w.id,
            name: w.name,
            currency: w.currency,
            balance: w.balance,
            transferred_today: w.transferred_today,
            withdrawn_today: w.withdrawn_today,
            is_active: w.is_active,
        }
    }
}

/// One leg of a wallet's history
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TransactionView {
    pub id: i64,
    pub reference: Reference,
    pub wallet_id: WalletId,
    pub related_wallet_id: Option<WalletId>,
    pub amount: Decimal,
    pub transaction_type: String,
    pub money_source: String,
    pub status: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionView {
    fn from(t: Transaction) -> Self {
        Self {
            id: t.id,
            reference: t.reference,
            wallet_id: t.wallet_id,
            related_wallet_id: t.related_wallet_id,
            amount: t.amount,
            transaction_type: t.transaction_type.as_str().to_string(),
            money_source: t.money_source.as_str().to_string(),
            status: t.status.as_str().to_string(),
            description: t.description,
            created_at: t.created_at,
        }
    }
}

/// The code itself only travels by SMS
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AtmCodeIssued {
    pub expires_at: DateTime<Utc>,
}

impl From<AtmCode> for AtmCodeIssued {
    fn from(code: AtmCode) -> Self {
        Self {
            expires_at: code.expires_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct BankTransferView {
    pub reference: Reference,
    pub wallet_id: WalletId,
    pub amount: Decimal,
    pub status: String,
}
