//! Firefox Accounts security-event webhook.
//!
//! `POST /fxa/events` carries a Security Event Token as its Bearer
//! credential. A verified token is stored as one unprocessed
//! `AccountEvent`; nothing is written for a rejected token.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use kitsune_auth::{SecurityEventClaims, SetError, bearer_token};
use kitsune_storage::{AccountEvent, NewAccountEvent, StorageError};
use serde_json::json;

use crate::metrics::{OUTCOME_ACCEPTED, OUTCOME_STORAGE_ERROR, record_account_event};
use crate::server::AppState;

/// Realm advertised in `WWW-Authenticate` challenges.
pub const REALM: &str = "kitsune";

/// Reasons a webhook delivery fails.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error(transparent)]
    Set(#[from] SetError),

    #[error("Failed to record account event: {0}")]
    Storage(#[from] StorageError),
}

impl WebhookError {
    /// Label used for the outcome metric.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Set(e) => e.category().as_str(),
            Self::Storage(_) => OUTCOME_STORAGE_ERROR,
        }
    }

    fn log(&self) {
        match self {
            Self::Set(SetError::SignatureInvalid) => {
                tracing::warn!(error = %self, "Rejected security event token with invalid signature");
            }
            Self::Set(e) if e.is_client_error() => {
                tracing::info!(error = %self, "Rejected malformed security event request");
            }
            Self::Set(e) => {
                tracing::info!(error = %self, category = %e.category(), "Rejected security event token");
            }
            Self::Storage(e) => {
                tracing::error!(error = %e, category = ?e.category(), "Failed to store verified security event");
            }
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        self.log();
        record_account_event(self.outcome());

        match self {
            Self::Set(e) if e.is_client_error() => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "invalid_request",
                    "error_description": e.to_string(),
                })),
            )
                .into_response(),
            Self::Set(_) => {
                let mut headers = HeaderMap::new();
                let www_auth = build_www_authenticate_header("invalid_token");
                if let Ok(value) = HeaderValue::from_str(&www_auth) {
                    headers.insert(header::WWW_AUTHENTICATE, value);
                }
                // Specific reason is logged above, never echoed to the caller
                (
                    StatusCode::UNAUTHORIZED,
                    headers,
                    Json(json!({
                        "error": "invalid_token",
                        "error_description": "The security event token could not be verified",
                    })),
                )
                    .into_response()
            }
            Self::Storage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "server_error" })),
            )
                .into_response(),
        }
    }
}

fn build_www_authenticate_header(error: &str) -> String {
    format!("Bearer realm=\"{REALM}\", error=\"{error}\"")
}

/// Receives one security event delivery.
///
/// The request body repeats the token and is not read; the Bearer credential
/// is authoritative.
pub async fn receive_security_event(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, WebhookError> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .map(|v| {
            v.to_str()
                .map_err(|_| SetError::malformed("Authorization header is not valid ASCII"))
        })
        .transpose()?;
    let token = bearer_token(authorization)?;

    let claims = state.verifier.verify(token).await?;
    let event = record_event(&state, &claims).await?;

    tracing::info!(
        event_id = event.id,
        fxa_uid = %event.fxa_uid,
        jwt_id = %event.jwt_id,
        profile_id = ?event.profile_id,
        "Recorded account event"
    );
    record_account_event(OUTCOME_ACCEPTED);
    Ok(StatusCode::ACCEPTED)
}

async fn record_event(
    state: &AppState,
    claims: &SecurityEventClaims,
) -> Result<AccountEvent, WebhookError> {
    let new = NewAccountEvent::new(
        &claims.events,
        &claims.sub,
        &claims.jti,
        claims.issued_at_text(),
    )?;

    let profile = state.storage.find_profile_by_fxa_uid(&claims.sub).await?;
    if profile.is_none() {
        tracing::debug!(fxa_uid = %claims.sub, "No local profile for account event");
    }

    let event = state
        .storage
        .create_event(new.with_profile(profile.map(|p| p.id)))
        .await?;
    Ok(event)
}
