//! Core data model: webhooks, events, deliveries and their statistics.

pub mod delivery;
pub mod event;
pub mod stats;
pub mod webhook;

pub use delivery::{Delivery, DeliveryStatus, FailureCause};
pub use event::Event;
pub use stats::{DeliveryStats, WebhookStats};
pub use webhook::{
    is_reserved_header, Webhook, WebhookDefaults, RESERVED_HEADERS, WILDCARD_EVENT,
};
