//! HookRelay - outbound webhook delivery.
//!
//! This library provides the delivery subsystem and the two HookRelay binaries:
//! - `hookrelay`: management API, event ingestion and the delivery workers
//! - `hookrelay-receiver`: inbound endpoint that verifies signed deliveries
//!
//! ## Architecture
//!
//! ```text
//! Event → Dispatcher → Delivery (per subscriber) → DeliveryWorker → subscriber URL
//!                                      ↑                    │
//!                                RetrySweeper ←── RETRYING ─┘
//! ```

pub mod config;
pub mod delivery;
pub mod error;
pub mod service;
pub mod signature;
pub mod store;
pub mod types;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use delivery::{DeliveryWorker, Dispatcher, RetrySweeper};
pub use error::{Error, Result};
pub use service::WebhookService;
pub use signature::SignaturePolicy;
pub use store::{
    DeliveryRepository, InMemoryDeliveryRepository, InMemoryWebhookRepository, WebhookRegistry,
    WebhookRepository,
};
pub use types::{
    Delivery, DeliveryStats, DeliveryStatus, Event, FailureCause, Webhook, WebhookStats,
};
pub use web::{api_router, receiver_router, AppState, InboundState};
