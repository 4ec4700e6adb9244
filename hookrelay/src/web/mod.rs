//! HTTP surfaces.
//!
//! - [`api_router`]: management API and event ingestion for the delivery service
//! - [`receiver_router`]: inbound endpoint that verifies signed deliveries

pub mod handlers;
pub mod inbound;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{
    AppState, DispatchResponse, EventRequest, HealthResponse, WebhookRequest, WebhookView,
};
pub use inbound::{InboundResponse, InboundState};

/// Router for the delivery service.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/webhooks",
            post(handlers::create_webhook).get(handlers::list_webhooks),
        )
        .route(
            "/webhooks/:id",
            get(handlers::get_webhook)
                .put(handlers::update_webhook)
                .delete(handlers::delete_webhook),
        )
        .route("/webhooks/:id/deliveries", get(handlers::webhook_deliveries))
        .route("/webhooks/:id/stats", get(handlers::webhook_stats))
        .route("/deliveries", get(handlers::list_deliveries))
        .route("/deliveries/:id", get(handlers::get_delivery))
        .route("/stats", get(handlers::stats))
        .route("/events", post(handlers::publish_event))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router for the inbound receiver.
pub fn receiver_router(state: InboundState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/webhooks/inbound", post(inbound::inbound_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
