//! Delivery service facade.
//!
//! Owns the registry, the delivery store and the worker pool, and exposes
//! the operations used by the HTTP API and embedding applications.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::delivery::{DeliveryWorker, Dispatcher, RetrySweeper, WorkerSettings};
use crate::error::{Error, Result};
use crate::store::{DeliveryRepository, InMemoryDeliveryRepository, WebhookRegistry};
use crate::types::{Delivery, DeliveryStats, Event, Webhook, WebhookDefaults, WebhookStats};

pub struct WebhookService {
    registry: WebhookRegistry,
    deliveries: Arc<dyn DeliveryRepository>,
    worker: Arc<DeliveryWorker>,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
    defaults: WebhookDefaults,
    sweep_interval: Duration,
    retention: Duration,
}

impl WebhookService {
    /// Service backed by in-memory storage.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_repositories(
            config,
            WebhookRegistry::in_memory(),
            Arc::new(InMemoryDeliveryRepository::new()),
        )
    }

    /// Service over caller-provided storage.
    pub fn with_repositories(
        config: &Config,
        registry: WebhookRegistry,
        deliveries: Arc<dyn DeliveryRepository>,
    ) -> Result<Self> {
        let shutdown = CancellationToken::new();
        let settings = WorkerSettings {
            user_agent: config.user_agent(),
            concurrency: config.worker_concurrency,
            response_body_limit: config.response_body_limit,
        };
        let worker = Arc::new(DeliveryWorker::new(
            registry.clone(),
            Arc::clone(&deliveries),
            settings,
            shutdown.clone(),
        )?);
        let dispatcher = Dispatcher::new(registry.clone(), Arc::clone(&deliveries), Arc::clone(&worker));

        Ok(Self {
            registry,
            deliveries,
            worker,
            dispatcher,
            shutdown,
            defaults: config.webhook_defaults(),
            sweep_interval: config.sweep_interval,
            retention: config.delivery_retention,
        })
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Fan an event out to its subscribers. Returns the created delivery ids.
    pub async fn dispatch(&self, event: &Event) -> Result<Vec<String>> {
        self.dispatcher.dispatch(event).await
    }

    // =========================================================================
    // Webhooks
    // =========================================================================

    pub async fn register_webhook(&self, webhook: Webhook) -> Result<String> {
        self.registry.register(webhook).await
    }

    /// Replace an existing webhook's configuration.
    pub async fn update_webhook(&self, id: &str, mut webhook: Webhook) -> Result<Webhook> {
        self.registry.get(id).await?;
        webhook.id = id.to_string();
        self.registry.register(webhook).await?;
        self.registry.get(id).await
    }

    pub async fn unregister_webhook(&self, id: &str) -> Result<()> {
        self.registry.unregister(id).await
    }

    pub async fn get_webhook(&self, id: &str) -> Result<Webhook> {
        self.registry.get(id).await
    }

    pub async fn list_webhooks(&self) -> Result<Vec<Webhook>> {
        self.registry.list().await
    }

    /// Policy applied to registrations that leave it unspecified.
    pub fn webhook_defaults(&self) -> WebhookDefaults {
        self.defaults
    }

    // =========================================================================
    // Deliveries
    // =========================================================================

    pub async fn get_delivery(&self, id: &str) -> Result<Delivery> {
        self.deliveries
            .get(id)
            .await?
            .ok_or_else(|| Error::DeliveryNotFound(id.to_string()))
    }

    pub async fn list_deliveries(&self) -> Result<Vec<Delivery>> {
        self.deliveries.list().await
    }

    /// Deliveries for one webhook, oldest first. Unknown ids yield an empty list.
    pub async fn get_deliveries_by_webhook(&self, webhook_id: &str) -> Result<Vec<Delivery>> {
        self.deliveries.list_by_webhook(webhook_id).await
    }

    pub async fn get_webhook_stats(&self, webhook_id: &str) -> Result<WebhookStats> {
        self.registry.get(webhook_id).await?;
        let stats = self.deliveries.stats(Some(webhook_id)).await?;
        Ok(WebhookStats::new(webhook_id, stats))
    }

    pub async fn delivery_stats(&self) -> Result<DeliveryStats> {
        self.deliveries.stats(None).await
    }

    /// Drop delivered records older than `retention`.
    pub async fn cleanup(&self, retention: Duration) -> Result<usize> {
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(retention)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        self.deliveries.purge_delivered_before(cutoff).await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Retry sweeper sharing this service's worker pool.
    pub fn sweeper(&self) -> RetrySweeper {
        RetrySweeper::new(
            Arc::clone(&self.deliveries),
            Arc::clone(&self.worker),
            self.sweep_interval,
            self.retention,
        )
    }

    /// Token cancelled when the service starts shutting down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Number of delivery tasks still running.
    pub fn in_flight(&self) -> usize {
        self.worker.in_flight()
    }

    /// Stop accepting retries and wait up to `grace` for in-flight deliveries.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.worker.shutdown(grace).await
    }
}
