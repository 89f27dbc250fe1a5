//! Request authentication
//!
//! Two schemes:
//! - Bearer JWT (HS256) for end users. Tokens are issued elsewhere; the
//!   gateway only verifies them and resolves `sub` to an active [`Actor`].
//! - Shared-secret `X-Webhook-Token` for the bank/ATM network.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::core_types::UserId;
use crate::ledger::models::Actor;

use super::state::AppState;
use super::types::{ApiError, error_codes};

pub const WEBHOOK_TOKEN_HEADER: &str = "x-webhook-token";

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user_id as string
    pub exp: usize,
    pub iat: usize,
}

impl Claims {
    pub fn user_id(&self) -> Option<UserId> {
        self.sub.parse().ok()
    }
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::new(Algorithm::HS256);
    let token_data = decode::<Claims>(token, &decoding_key, &validation)?;
    Ok(token_data.claims)
}

/// Resolve the bearer token to an [`Actor`] and inject it as an extension
pub async fn jwt_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::UNAUTHORIZED,
                error_codes::MISSING_AUTH,
                "Missing Authorization header",
            )
        })?;

    let Some(token) = auth_header.strip_prefix("Bearer ") else {
        return Err(ApiError::unauthorized("Invalid token format"));
    };

    if state.jwt_secret.is_empty() {
        return Err(ApiError::service_unavailable("Authentication not configured"));
    }

    let claims = verify_token(&state.jwt_secret, token)
        .map_err(|_| ApiError::unauthorized("Invalid or expired token"))?;
    let user_id = claims
        .user_id()
        .ok_or_else(|| ApiError::unauthorized("Invalid user ID in token"))?;

    let actor = state
        .store
        .load_actor(user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Unknown user"))?;
    if !actor.is_active {
        tracing::warn!(user_id, "Inactive user rejected");
        return Err(ApiError::forbidden("User account is inactive"));
    }

    request.extensions_mut().insert::<Actor>(actor);
    Ok(next.run(request).await)
}

/// Compare `X-Webhook-Token` with the configured secret
///
/// An unset secret rejects every call.
pub fn check_webhook_token(headers: &HeaderMap, secret: &str) -> Result<(), ApiError> {
    let presented = headers
        .get(WEBHOOK_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();

    let matches: bool = presented.as_bytes().ct_eq(secret.as_bytes()).into();
    if secret.is_empty() || !matches {
        tracing::warn!("Webhook call with invalid token");
        return Err(ApiError::forbidden("Invalid webhook token"));
    }
    Ok(())
}
