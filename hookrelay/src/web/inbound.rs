//! Receiving side of signed deliveries.
//!
//! The signature is checked against the raw request bytes before anything
//! is parsed, so a tampered body is rejected without being decoded.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::delivery::{HEADER_EVENT, HEADER_SIGNATURE};
use crate::signature::{self, SignaturePolicy};
use crate::types::Event;

/// State for the inbound receiver.
#[derive(Clone)]
pub struct InboundState {
    pub secret: Option<Arc<str>>,
    pub policy: SignaturePolicy,
}

impl InboundState {
    pub fn new(secret: Option<String>, policy: SignaturePolicy) -> Self {
        Self {
            secret: secret.map(Arc::from),
            policy,
        }
    }
}

/// Inbound webhook response.
#[derive(Debug, Serialize, Deserialize)]
pub struct InboundResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl InboundResponse {
    fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            event_id: None,
        }
    }
}

/// Inbound webhook endpoint.
///
/// 1. Verifies `X-Webhook-Signature` over the raw body
/// 2. Parses the body as an event
/// 3. Acknowledges with the event id
pub async fn inbound_webhook(
    State(state): State<InboundState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let provided = headers
        .get(HEADER_SIGNATURE)
        .and_then(|v| v.to_str().ok());

    info!(
        body_length = body.len(),
        has_signature = provided.is_some(),
        event_type = headers
            .get(HEADER_EVENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(""),
        "inbound_webhook_received"
    );

    if !signature::verify_with_policy(&body, provided, state.secret.as_deref(), state.policy) {
        warn!(has_signature = provided.is_some(), "inbound_signature_invalid");
        return (
            StatusCode::UNAUTHORIZED,
            Json(InboundResponse::rejected("invalid signature")),
        );
    }

    let event: Event = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "inbound_payload_invalid");
            return (
                StatusCode::BAD_REQUEST,
                Json(InboundResponse::rejected(format!("invalid payload: {}", e))),
            );
        }
    };

    info!(
        event_id = %event.id,
        event_type = %event.event_type,
        source = %event.source,
        "inbound_webhook_accepted"
    );

    (
        StatusCode::OK,
        Json(InboundResponse {
            success: true,
            message: "webhook received".to_string(),
            event_id: Some(event.id),
        }),
    )
}
