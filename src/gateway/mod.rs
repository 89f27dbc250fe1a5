//! HTTP Gateway
//!
//! Thin axum boundary over the ledger:
//!
//! - `/api/v1/health`: liveness + store reachability
//! - `/api/v1/webhooks/bank`: bank/ATM events, `X-Webhook-Token` auth
//! - `/api/v1/transfers`, `/api/v1/wallets`, `/api/v1/atm`: end-user routes,
//!   bearer JWT auth

pub mod auth;
pub mod handlers;
pub mod state;
pub mod types;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tokio::net::TcpListener;

pub use state::AppState;

/// Build the complete router
pub fn build_router(state: Arc<AppState>) -> Router {
    let user_routes = Router::new()
        // Wallet-to-wallet transfers
        .route("/transfers", post(handlers::initiate_transfer))
        .route("/transfers/{reference}", get(handlers::get_transfer))
        .route(
            "/transfers/{reference}/action",
            post(handlers::transfer_action),
        )
        .route(
            "/transfers/{reference}/cancel",
            post(handlers::cancel_transfer),
        )
        // Wallet lifecycle
        .route(
            "/wallets",
            post(handlers::open_wallet).get(handlers::list_wallets),
        )
        .route("/wallets/{wallet_id}", get(handlers::get_wallet))
        .route(
            "/wallets/{wallet_id}/transactions",
            get(handlers::wallet_transactions),
        )
        .route(
            "/wallets/{wallet_id}/deactivate",
            post(handlers::deactivate_wallet),
        )
        .route(
            "/wallets/{wallet_id}/bank-transfer",
            post(handlers::bank_transfer_out),
        )
        // ATM credentials
        .route("/atm/codes", post(handlers::request_atm_code))
        .layer(from_fn_with_state(state.clone(), auth::jwt_auth_middleware));

    Router::new()
        .route("/api/v1/health", get(handlers::health_check))
        .route("/api/v1/webhooks/bank", post(handlers::bank_webhook))
        .nest("/api/v1", user_routes)
        .with_state(state)
}

/// Bind and serve until the process exits
pub async fn run_server(host: &str, port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = build_router(state);

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!(%addr, "Gateway listening");
    axum::serve(listener, app)
        .await
        .context("Gateway server error")?;
    Ok(())
}
