//! `/api/v1` handlers
//!
//! Thin adapters from HTTP requests to [`PushService`](crate::push::PushService)
//! operations.

use super::ServerAppState;
use crate::push::encryption::decode_auth_secret;
use crate::push::keys::decode_public_key;
use crate::push::{Notification, PushError, Subscription, SubscriptionEndpoint};
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Error type for the API handlers
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<PushError> for ApiError {
    fn from(e: PushError) -> Self {
        let status = match e {
            PushError::MalformedKey(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub subscribers: usize,
    pub version: &'static str,
}

/// GET /publicSigningKey - raw 65-byte uncompressed server key
pub async fn public_signing_key(State(state): State<ServerAppState>) -> impl IntoResponse {
    let key = state.push.server_public_key_bytes();
    (
        [(CONTENT_TYPE, "application/octet-stream")],
        key.as_bytes().to_vec(),
    )
}

/// POST /subscribe
pub async fn subscribe(
    State(state): State<ServerAppState>,
    Json(subscription): Json<Subscription>,
) -> Result<StatusCode, ApiError> {
    // Reject keys that could never be encrypted to
    decode_public_key(&subscription.keys.p256dh)?;
    decode_auth_secret(&subscription.keys.auth)?;

    log::debug!("Subscribe: {}", subscription.endpoint);
    state.push.register_subscription(subscription);
    Ok(StatusCode::CREATED)
}

/// POST /unsubscribe
pub async fn unsubscribe(
    State(state): State<ServerAppState>,
    Json(body): Json<SubscriptionEndpoint>,
) -> StatusCode {
    state.push.remove_subscription(&body.endpoint);
    StatusCode::OK
}

/// POST /isSubscribed
pub async fn is_subscribed(
    State(state): State<ServerAppState>,
    Json(body): Json<SubscriptionEndpoint>,
) -> Json<bool> {
    Json(state.push.is_subscribed(&body.endpoint))
}

/// POST /send - broadcast a notification to every subscriber
pub async fn send(
    State(state): State<ServerAppState>,
    Json(notification): Json<Notification>,
) -> Result<&'static str, ApiError> {
    state.push.broadcast(&notification).await?;
    Ok("Message sent")
}

/// GET /health
pub async fn health(State(state): State<ServerAppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        subscribers: state.push.subscriber_count(),
        version: env!("CARGO_PKG_VERSION"),
    })
}
