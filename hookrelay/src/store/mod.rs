//! Storage for webhook registrations and delivery records.
//!
//! Both repositories are object-safe traits so a deployment can swap the
//! in-memory maps for durable storage. Implementations must:
//! - allow many concurrent readers and serialize writers
//! - hand out clones, never references into shared state
//! - apply [`DeliveryRepository::update`] atomically with respect to other
//!   writers, since it is how delivery attempts are claimed

pub mod memory;
pub mod registry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{Delivery, DeliveryStats, Webhook};

pub use memory::{InMemoryDeliveryRepository, InMemoryWebhookRepository};
pub use registry::WebhookRegistry;

/// Persistence for webhook registrations.
#[async_trait]
pub trait WebhookRepository: Send + Sync {
    /// Insert or replace a webhook by id.
    async fn save(&self, webhook: Webhook) -> Result<()>;

    async fn load(&self, id: &str) -> Result<Option<Webhook>>;

    /// Remove a webhook, returning whether it existed.
    async fn remove(&self, id: &str) -> Result<bool>;

    /// All webhooks, sorted by id.
    async fn list(&self) -> Result<Vec<Webhook>>;
}

/// Persistence for delivery records.
#[async_trait]
pub trait DeliveryRepository: Send + Sync {
    async fn insert(&self, delivery: Delivery) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<Delivery>>;

    /// All deliveries, oldest first.
    async fn list(&self) -> Result<Vec<Delivery>>;

    async fn list_by_webhook(&self, webhook_id: &str) -> Result<Vec<Delivery>>;

    /// Apply `change` to a record under the write lock.
    ///
    /// The closure works on a copy; the copy is stored and returned only when
    /// the closure returns `true`. Returns `Ok(None)` when the change was
    /// declined and `Error::DeliveryNotFound` when no record has that id.
    async fn update(
        &self,
        id: &str,
        change: &mut (dyn for<'d> FnMut(&'d mut Delivery) -> bool + Send),
    ) -> Result<Option<Delivery>>;

    /// Deliveries whose scheduled retry is due at `now`.
    async fn due_for_retry(&self, now: DateTime<Utc>) -> Result<Vec<Delivery>>;

    /// Drop delivered records last updated before `cutoff`.
    async fn purge_delivered_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Counts by status, optionally restricted to one webhook.
    async fn stats(&self, webhook_id: Option<&str>) -> Result<DeliveryStats>;
}
