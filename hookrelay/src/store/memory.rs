//! In-memory repositories backed by read-mostly locked maps.
//!
//! State does not survive a restart. Deployments that need the retry
//! sweeper to recover work after a crash should provide a durable
//! implementation of the same traits.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::{DeliveryRepository, WebhookRepository};
use crate::error::{Error, Result};
use crate::types::{Delivery, DeliveryStats, DeliveryStatus, Webhook};

/// Webhook registrations held in a `RwLock<HashMap>`.
#[derive(Debug, Default)]
pub struct InMemoryWebhookRepository {
    webhooks: RwLock<HashMap<String, Webhook>>,
}

impl InMemoryWebhookRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebhookRepository for InMemoryWebhookRepository {
    async fn save(&self, webhook: Webhook) -> Result<()> {
        let mut webhooks = self.webhooks.write().await;
        webhooks.insert(webhook.id.clone(), webhook);
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Webhook>> {
        let webhooks = self.webhooks.read().await;
        Ok(webhooks.get(id).cloned())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let mut webhooks = self.webhooks.write().await;
        Ok(webhooks.remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<Webhook>> {
        let webhooks = self.webhooks.read().await;
        let mut all: Vec<Webhook> = webhooks.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

/// Delivery records held in a `RwLock<HashMap>`.
#[derive(Debug, Default)]
pub struct InMemoryDeliveryRepository {
    deliveries: RwLock<HashMap<String, Delivery>>,
}

impl InMemoryDeliveryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted(mut deliveries: Vec<Delivery>) -> Vec<Delivery> {
    deliveries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    deliveries
}

#[async_trait]
impl DeliveryRepository for InMemoryDeliveryRepository {
    async fn insert(&self, delivery: Delivery) -> Result<()> {
        let mut deliveries = self.deliveries.write().await;
        deliveries.insert(delivery.id.clone(), delivery);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Delivery>> {
        let deliveries = self.deliveries.read().await;
        Ok(deliveries.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Delivery>> {
        let deliveries = self.deliveries.read().await;
        Ok(sorted(deliveries.values().cloned().collect()))
    }

    async fn list_by_webhook(&self, webhook_id: &str) -> Result<Vec<Delivery>> {
        let deliveries = self.deliveries.read().await;
        Ok(sorted(
            deliveries
                .values()
                .filter(|d| d.webhook_id == webhook_id)
                .cloned()
                .collect(),
        ))
    }

    async fn update(
        &self,
        id: &str,
        change: &mut (dyn for<'d> FnMut(&'d mut Delivery) -> bool + Send),
    ) -> Result<Option<Delivery>> {
        let mut deliveries = self.deliveries.write().await;
        let current = deliveries
            .get_mut(id)
            .ok_or_else(|| Error::DeliveryNotFound(id.to_string()))?;

        let mut updated = current.clone();
        if !change(&mut updated) {
            return Ok(None);
        }

        *current = updated.clone();
        Ok(Some(updated))
    }

    async fn due_for_retry(&self, now: DateTime<Utc>) -> Result<Vec<Delivery>> {
        let deliveries = self.deliveries.read().await;
        Ok(sorted(
            deliveries
                .values()
                .filter(|d| d.is_due_for_retry(now))
                .cloned()
                .collect(),
        ))
    }

    async fn purge_delivered_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut deliveries = self.deliveries.write().await;
        let before = deliveries.len();
        deliveries
            .retain(|_, d| !(d.status == DeliveryStatus::Delivered && d.updated_at < cutoff));
        let purged = before - deliveries.len();

        debug!(purged = purged, remaining = deliveries.len(), "deliveries_purged");
        Ok(purged)
    }

    async fn stats(&self, webhook_id: Option<&str>) -> Result<DeliveryStats> {
        let deliveries = self.deliveries.read().await;
        Ok(DeliveryStats::from_deliveries(deliveries.values().filter(
            |d| webhook_id.map(|id| d.webhook_id == id).unwrap_or(true),
        )))
    }
}
