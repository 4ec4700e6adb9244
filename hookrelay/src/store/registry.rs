//! Webhook registry: validation, identity and subscription matching on top
//! of a [`WebhookRepository`].

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::{InMemoryWebhookRepository, WebhookRepository};
use crate::error::{Error, Result};
use crate::types::Webhook;

/// Table of subscriber endpoints. Cheap to clone; clones share storage.
#[derive(Clone)]
pub struct WebhookRegistry {
    repo: Arc<dyn WebhookRepository>,
}

impl WebhookRegistry {
    pub fn new(repo: Arc<dyn WebhookRepository>) -> Self {
        Self { repo }
    }

    /// Registry backed by an in-memory map.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryWebhookRepository::new()))
    }

    /// Register a webhook, or update it when the id is already known.
    ///
    /// Assigns an id when empty. `created_at` is kept across updates and
    /// `updated_at` is always refreshed.
    pub async fn register(&self, mut webhook: Webhook) -> Result<String> {
        webhook.validate()?;

        let now = Utc::now();
        if webhook.id.trim().is_empty() {
            webhook.id = Uuid::new_v4().to_string();
            webhook.created_at = now;
        } else {
            webhook.created_at = match self.repo.load(&webhook.id).await? {
                Some(existing) => existing.created_at,
                None => now,
            };
        }
        webhook.updated_at = now;

        let id = webhook.id.clone();
        info!(
            webhook_id = %id,
            url = %webhook.url,
            events = ?webhook.events,
            signed = webhook.signing_secret().is_some(),
            active = webhook.active,
            "webhook_registered"
        );

        self.repo.save(webhook).await?;
        Ok(id)
    }

    /// Remove a webhook. Unknown ids are not an error.
    pub async fn unregister(&self, id: &str) -> Result<()> {
        let existed = self.repo.remove(id).await?;
        info!(webhook_id = %id, existed = existed, "webhook_unregistered");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Webhook> {
        self.repo
            .load(id)
            .await?
            .ok_or_else(|| Error::WebhookNotFound(id.to_string()))
    }

    /// Snapshot of all webhooks, sorted by id.
    pub async fn list(&self) -> Result<Vec<Webhook>> {
        self.repo.list().await
    }

    /// Active webhooks subscribed to `event_type` or the wildcard, sorted by id.
    pub async fn matching_subscribers(&self, event_type: &str) -> Result<Vec<Webhook>> {
        let mut matching: Vec<Webhook> = self
            .repo
            .list()
            .await?
            .into_iter()
            .filter(|w| w.matches(event_type))
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matching)
    }
}
