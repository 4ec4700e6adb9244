//! Management API handlers.
//!
//! Thin adapters over [`WebhookService`]: decode the request, call the
//! service, encode the result. Errors render through [`crate::Error`]'s
//! `IntoResponse` impl as `{error, message, status}`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::Result;
use crate::service::WebhookService;
use crate::types::{Delivery, DeliveryStats, Event, Webhook, WebhookDefaults, WebhookStats};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WebhookService>,
}

impl AppState {
    pub fn new(service: Arc<WebhookService>) -> Self {
        Self { service }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Webhooks
// =============================================================================

/// Registration body. Omitted policy fields take the service defaults.
#[derive(Debug, Deserialize)]
pub struct WebhookRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub url: String,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
}

impl WebhookRequest {
    pub fn into_webhook(self, defaults: WebhookDefaults) -> Webhook {
        let mut webhook = Webhook::new(self.url, self.events);
        webhook.id = self.id.unwrap_or_default();
        webhook.secret = self.secret;
        webhook.active = self.active.unwrap_or(true);
        webhook.headers = self.headers;
        webhook.timeout_ms = self.timeout_ms.unwrap_or(defaults.timeout_ms);
        webhook.max_retries = self.max_retries.unwrap_or(defaults.max_retries);
        webhook.retry_delay_ms = self.retry_delay_ms.unwrap_or(defaults.retry_delay_ms);
        webhook
    }
}

/// Webhook as returned by the API. The secret is never echoed back.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookView {
    pub id: String,
    pub url: String,
    pub events: Vec<String>,
    pub has_secret: bool,
    pub active: bool,
    pub headers: HashMap<String, String>,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Webhook> for WebhookView {
    fn from(webhook: Webhook) -> Self {
        Self {
            has_secret: webhook.signing_secret().is_some(),
            id: webhook.id,
            url: webhook.url,
            events: webhook.events,
            active: webhook.active,
            headers: webhook.headers,
            timeout_ms: webhook.timeout_ms,
            max_retries: webhook.max_retries,
            retry_delay_ms: webhook.retry_delay_ms,
            created_at: webhook.created_at,
            updated_at: webhook.updated_at,
        }
    }
}

pub async fn create_webhook(
    State(state): State<AppState>,
    Json(req): Json<WebhookRequest>,
) -> Result<impl IntoResponse> {
    let webhook = req.into_webhook(state.service.webhook_defaults());
    let id = state.service.register_webhook(webhook).await?;
    let stored = state.service.get_webhook(&id).await?;
    Ok((StatusCode::CREATED, Json(WebhookView::from(stored))))
}

pub async fn list_webhooks(State(state): State<AppState>) -> Result<Json<Vec<WebhookView>>> {
    let webhooks = state.service.list_webhooks().await?;
    Ok(Json(webhooks.into_iter().map(WebhookView::from).collect()))
}

pub async fn get_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WebhookView>> {
    let webhook = state.service.get_webhook(&id).await?;
    Ok(Json(webhook.into()))
}

pub async fn update_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<WebhookRequest>,
) -> Result<Json<WebhookView>> {
    let webhook = req.into_webhook(state.service.webhook_defaults());
    let updated = state.service.update_webhook(&id, webhook).await?;
    Ok(Json(updated.into()))
}

pub async fn delete_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.service.unregister_webhook(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn webhook_deliveries(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Delivery>>> {
    Ok(Json(state.service.get_deliveries_by_webhook(&id).await?))
}

pub async fn webhook_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WebhookStats>> {
    Ok(Json(state.service.get_webhook_stats(&id).await?))
}

// =============================================================================
// Deliveries
// =============================================================================

pub async fn list_deliveries(State(state): State<AppState>) -> Result<Json<Vec<Delivery>>> {
    Ok(Json(state.service.list_deliveries().await?))
}

pub async fn get_delivery(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Delivery>> {
    Ok(Json(state.service.get_delivery(&id).await?))
}

/// Global counts by status.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub deliveries: DeliveryStats,
    pub success_rate: f64,
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let deliveries = state.service.delivery_stats().await?;
    Ok(Json(StatsResponse {
        success_rate: deliveries.success_rate(),
        deliveries,
    }))
}

// =============================================================================
// Events
// =============================================================================

/// Event submitted for delivery.
#[derive(Debug, Deserialize)]
pub struct EventRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl EventRequest {
    pub fn into_event(self) -> Event {
        let mut event = Event::new(self.event_type, self.payload);
        if let Some(id) = self.id.filter(|id| !id.trim().is_empty()) {
            event = event.with_id(id);
        }
        if let Some(source) = self.source.filter(|s| !s.trim().is_empty()) {
            event = event.with_source(source);
        }
        event
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub event_id: String,
    pub deliveries: Vec<String>,
}

/// Accept an event and fan it out. Delivery happens in the background.
pub async fn publish_event(
    State(state): State<AppState>,
    Json(req): Json<EventRequest>,
) -> Result<impl IntoResponse> {
    let event = req.into_event();
    info!(
        event_id = %event.id,
        event_type = %event.event_type,
        "event_received"
    );

    let deliveries = state.service.dispatch(&event).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(DispatchResponse {
            event_id: event.id,
            deliveries,
        }),
    ))
}
