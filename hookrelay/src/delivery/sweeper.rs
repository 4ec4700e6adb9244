//! Periodic recovery of retries whose waiting task is gone, plus retention
//! of delivered records.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::DeliveryWorker;
use crate::error::Result;
use crate::store::DeliveryRepository;

pub struct RetrySweeper {
    deliveries: Arc<dyn DeliveryRepository>,
    worker: Arc<DeliveryWorker>,
    interval: Duration,
    retention: Duration,
}

impl RetrySweeper {
    pub fn new(
        deliveries: Arc<dyn DeliveryRepository>,
        worker: Arc<DeliveryWorker>,
        interval: Duration,
        retention: Duration,
    ) -> Self {
        Self {
            deliveries,
            worker,
            interval,
            retention,
        }
    }

    /// Reschedule every delivery whose retry is due at `now`.
    ///
    /// Records still owned by a sleeping task are scheduled too; whichever
    /// task claims first wins and the other exits without sending.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.deliveries.due_for_retry(now).await?;
        for delivery in &due {
            debug!(
                delivery_id = %delivery.id,
                status = delivery.status.as_str(),
                attempt = delivery.attempt,
                "delivery_retry_resumed"
            );
            self.worker.schedule(delivery.id.clone());
        }
        Ok(due.len())
    }

    /// Drop delivered records older than the retention window.
    pub async fn purge(&self, now: DateTime<Utc>) -> Result<usize> {
        let retention = chrono::Duration::from_std(self.retention).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(retention).unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.deliveries.purge_delivered_before(cutoff).await
    }

    /// Sweep on a fixed interval until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = self.interval.as_secs(), "retry_sweeper_started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let now = Utc::now();
            match self.sweep(now).await {
                Ok(0) => {}
                Ok(n) => info!(resumed = n, "retry_sweep_completed"),
                Err(e) => error!(error = %e, "retry_sweep_failed"),
            }
            match self.purge(now).await {
                Ok(0) => {}
                Ok(n) => info!(purged = n, "delivery_retention_purged"),
                Err(e) => error!(error = %e, "delivery_retention_purge_failed"),
            }
        }

        info!("retry_sweeper_stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::WorkerSettings;
    use crate::store::{InMemoryDeliveryRepository, WebhookRegistry};
    use crate::types::{Delivery, Event, Webhook};
    use serde_json::Map;

    fn sweeper(deliveries: Arc<dyn DeliveryRepository>, retention: Duration) -> RetrySweeper {
        let settings = WorkerSettings {
            user_agent: "Test-Webhook/0.0".to_string(),
            concurrency: 2,
            response_body_limit: 64,
        };
        let worker = DeliveryWorker::new(
            WebhookRegistry::in_memory(),
            Arc::clone(&deliveries),
            settings,
            CancellationToken::new(),
        )
        .unwrap();
        RetrySweeper::new(deliveries, Arc::new(worker), Duration::from_millis(10), retention)
    }

    fn delivered(updated_at: DateTime<Utc>) -> Delivery {
        let webhook = Webhook::new("https://example.test/hook", vec!["*".to_string()]).with_id("wh-1");
        let mut delivery = Delivery::new(&webhook, &Event::new("job.completed", Map::new()));
        delivery.begin_attempt(updated_at);
        delivery.record_success(200, None, updated_at);
        delivery
    }

    #[tokio::test]
    async fn test_purge_respects_retention() {
        let deliveries: Arc<dyn DeliveryRepository> = Arc::new(InMemoryDeliveryRepository::new());
        let now = Utc::now();
        deliveries.insert(delivered(now - chrono::Duration::hours(3))).await.unwrap();
        deliveries.insert(delivered(now)).await.unwrap();

        let sweeper = sweeper(Arc::clone(&deliveries), Duration::from_secs(3600));
        assert_eq!(sweeper.purge(now).await.unwrap(), 1);
        assert_eq!(deliveries.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_ignores_pending_and_future_retries() {
        let deliveries: Arc<dyn DeliveryRepository> = Arc::new(InMemoryDeliveryRepository::new());
        let webhook = Webhook::new("https://example.test/hook", vec!["*".to_string()]).with_id("wh-1");
        deliveries
            .insert(Delivery::new(&webhook, &Event::new("job.completed", Map::new())))
            .await
            .unwrap();

        let sweeper = sweeper(deliveries, Duration::from_secs(3600));
        assert_eq!(sweeper.sweep(Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown() {
        let deliveries: Arc<dyn DeliveryRepository> = Arc::new(InMemoryDeliveryRepository::new());
        let sweeper = sweeper(deliveries, Duration::from_secs(3600));
        let token = CancellationToken::new();
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), sweeper.run(token)).await;
        assert!(result.is_ok());
    }
}
