//! HTTP handlers
//!
//! Each handler is a thin translation between the wire and one ledger
//! operation; all business rules live below the gateway.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;
use serde::Serialize;

use crate::core_types::{Reference, WalletId};
use crate::events::EventOutcome;
use crate::ledger::models::Actor;
use crate::transfer::{TransferAction, TransferRequest};

use super::auth::check_webhook_token;
use super::state::AppState;
use super::types::{
    ApiError, ApiResponse, ApiResult, AtmCodeIssued, BankTransferRequest, BankTransferView,
    InitiateTransferRequest, OpenWalletRequest, TransactionView, TransferActionRequest,
    TransferView, WalletView, created, error_codes, ok,
};

/// History page size when `limit` is absent or unparseable
const DEFAULT_HISTORY_LIMIT: i64 = 50;

// ============================================================================
// System
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub timestamp_ms: i64,
}

/// Healthy: 200 + `{code: 0, data: {timestamp_ms}}`; store unreachable: 503
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    if let Some(db) = &state.pg_db
        && let Err(e) = db.health_check().await
    {
        tracing::error!(error = %e, "Health check failed");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse {
                code: error_codes::SERVICE_UNAVAILABLE,
                msg: "unavailable".to_string(),
                data: None,
            }),
        );
    }

    (
        StatusCode::OK,
        Json(ApiResponse::success(HealthResponse {
            timestamp_ms: Utc::now().timestamp_millis(),
        })),
    )
}

// ============================================================================
// Bank / ATM webhook
// ============================================================================

/// POST /api/v1/webhooks/bank
///
/// 200 with the outcome on success, 400 on any failed event, 403 on a bad
/// token. The body is parsed here so malformed JSON gets the same shape.
pub async fn bank_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<EventOutcome>), ApiError> {
    check_webhook_token(&headers, &state.webhook_secret)?;

    let event: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed webhook body");
            let outcome = EventOutcome {
                success: false,
                message: "Malformed JSON body".to_string(),
                code: Some("VALIDATION_ERROR"),
                errors: None,
                data: None,
            };
            return Ok((StatusCode::BAD_REQUEST, Json(outcome)));
        }
    };

    let outcome = state.events.dispatch(&event).await;
    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(outcome)))
}

// ============================================================================
// Transfers
// ============================================================================

/// POST /api/v1/transfers
pub async fn initiate_transfer(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<InitiateTransferRequest>,
) -> ApiResult<TransferView> {
    let legs = state
        .transfers
        .initiate(
            &actor,
            TransferRequest {
                source_wallet_id: req.source_wallet_id,
                target_wallet_id: req.target_wallet_id,
                amount: req.amount.inner(),
                description: req.description,
            },
        )
        .await?;
    created(legs.into())
}

/// POST /api/v1/transfers/{reference}/action
pub async fn transfer_action(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(reference): Path<String>,
    Json(req): Json<TransferActionRequest>,
) -> ApiResult<TransferView> {
    let action: TransferAction = req.action.parse().map_err(ApiError::bad_request)?;
    let legs = state
        .transfers
        .finalize(&actor, &Reference::from(reference), action)
        .await?;
    ok(legs.into())
}

/// POST /api/v1/transfers/{reference}/cancel
pub async fn cancel_transfer(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(reference): Path<String>,
) -> ApiResult<TransferView> {
    let legs = state
        .transfers
        .cancel(&actor, &Reference::from(reference))
        .await?;
    ok(legs.into())
}

/// GET /api/v1/transfers/{reference}
pub async fn get_transfer(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(reference): Path<String>,
) -> ApiResult<TransferView> {
    let legs = state
        .transfers
        .legs(&actor, &Reference::from(reference))
        .await?;
    ok(legs.into())
}

// ============================================================================
// Wallets
// ============================================================================

/// POST /api/v1/wallets
pub async fn open_wallet(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<OpenWalletRequest>,
) -> ApiResult<WalletView> {
    let wallet = state
        .engine
        .open_wallet(&actor, &req.currency, req.name.as_deref())
        .await?;
    created(wallet.into())
}

/// GET /api/v1/wallets
pub async fn list_wallets(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Vec<WalletView>> {
    let wallets = state.engine.wallets(&actor).await?;
    ok(wallets.into_iter().map(WalletView::from).collect())
}

/// GET /api/v1/wallets/{wallet_id}/transactions?limit=50
pub async fn wallet_transactions(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(wallet_id): Path<WalletId>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Vec<TransactionView>> {
    let limit: i64 = params
        .get("limit")
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_HISTORY_LIMIT);
    let legs = state.engine.transactions(&actor, wallet_id, limit).await?;
    ok(legs.into_iter().map(TransactionView::from).collect())
}

/// GET /api/v1/wallets/{wallet_id}
pub async fn get_wallet(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(wallet_id): Path<WalletId>,
) -> ApiResult<WalletView> {
    let wallet = state.engine.wallet(&actor, wallet_id).await?;
    ok(wallet.into())
}

/// POST /api/v1/wallets/{wallet_id}/deactivate
pub async fn deactivate_wallet(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(wallet_id): Path<WalletId>,
) -> ApiResult<WalletView> {
    let wallet = state.engine.deactivate_wallet(&actor, wallet_id).await?;
    ok(wallet.into())
}

/// POST /api/v1/wallets/{wallet_id}/bank-transfer
pub async fn bank_transfer_out(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(wallet_id): Path<WalletId>,
    Json(req): Json<BankTransferRequest>,
) -> ApiResult<BankTransferView> {
    let leg = state
        .engine
        .bank_transfer_out(&actor, wallet_id, req.amount.inner())
        .await?;
    ok(BankTransferView {
        reference: leg.reference,
        wallet_id: leg.wallet_id,
        amount: leg.amount,
        status: leg.status.as_str().to_string(),
    })
}

// ============================================================================
// ATM
// ============================================================================

/// POST /api/v1/atm/codes
pub async fn request_atm_code(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<AtmCodeIssued> {
    let code = state.atm.issue(&actor).await?;
    created(code.into())
}
