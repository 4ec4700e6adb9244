//! Delivery worker - the send-with-retry state machine.
//!
//! Each delivery runs as its own task on a shared [`TaskTracker`]. A task
//! loops: wait for a pool permit, claim the record (`→ SENDING`), POST the
//! event, record the outcome, then either stop or sleep until the next
//! attempt is due. Waiting for a permit and the backoff sleep both give way
//! to the shutdown token.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Response};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::signature;
use crate::store::{DeliveryRepository, WebhookRegistry};
use crate::types::{is_reserved_header, Delivery, DeliveryStatus, Webhook};

pub const HEADER_EVENT: &str = "X-Webhook-Event";
pub const HEADER_ID: &str = "X-Webhook-ID";
pub const HEADER_TIMESTAMP: &str = "X-Webhook-Timestamp";
pub const HEADER_SIGNATURE: &str = "X-Webhook-Signature";

/// Tunables for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// User-Agent sent with every delivery
    pub user_agent: String,
    /// Maximum number of HTTP attempts in flight at once
    pub concurrency: usize,
    /// Bytes of the response body kept on the record
    pub response_body_limit: usize,
}

/// Result of a single HTTP attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptOutcome {
    pub success: bool,
    /// HTTP status, 0 when no response arrived
    pub status_code: u16,
    pub body: Option<String>,
    pub error: Option<String>,
}

impl AttemptOutcome {
    fn delivered(status_code: u16, body: Option<String>) -> Self {
        Self {
            success: true,
            status_code,
            body,
            error: None,
        }
    }

    fn failed(status_code: u16, body: Option<String>, error: String) -> Self {
        Self {
            success: false,
            status_code,
            body,
            error: Some(error),
        }
    }
}

/// Executes deliveries. Shared behind an `Arc` by the dispatcher and sweeper.
pub struct DeliveryWorker {
    client: Client,
    registry: WebhookRegistry,
    deliveries: Arc<dyn DeliveryRepository>,
    permits: Arc<Semaphore>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
    user_agent: String,
    response_body_limit: usize,
}

impl DeliveryWorker {
    /// Create a worker with a shared HTTP client.
    ///
    /// Per-attempt deadlines come from each delivery's timeout, so the
    /// client itself carries none. Redirects are not followed.
    pub fn new(
        registry: WebhookRegistry,
        deliveries: Arc<dyn DeliveryRepository>,
        settings: WorkerSettings,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(settings.concurrency.min(100))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            registry,
            deliveries,
            permits: Arc::new(Semaphore::new(settings.concurrency.max(1))),
            tasks: TaskTracker::new(),
            shutdown,
            user_agent: settings.user_agent,
            response_body_limit: settings.response_body_limit,
        })
    }

    /// Run a delivery on its own task. Returns immediately.
    pub fn schedule(self: &Arc<Self>, delivery_id: String) {
        let worker = Arc::clone(self);
        self.tasks.spawn(async move {
            worker.run(&delivery_id).await;
        });
    }

    /// Number of delivery tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Cancel waiting deliveries and wait for running tasks, up to `grace`.
    ///
    /// Returns `false` if tasks were still running when the grace period ran out.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.shutdown.cancel();
        self.tasks.close();

        match tokio::time::timeout(grace, self.tasks.wait()).await {
            Ok(()) => {
                info!("delivery_workers_drained");
                true
            }
            Err(_) => {
                warn!(
                    remaining = self.tasks.len(),
                    grace_ms = grace.as_millis() as u64,
                    "delivery_workers_drain_timeout"
                );
                false
            }
        }
    }

    /// Drive one delivery until it is delivered, fails, or is cancelled.
    ///
    /// Returns quietly when the record cannot be claimed, which means
    /// another task owns it or it already reached an outcome.
    pub async fn run(&self, delivery_id: &str) {
        let mut not_before: Option<DateTime<Utc>> = None;

        loop {
            let permit = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    self.cancel(delivery_id).await;
                    return;
                }
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        self.cancel(delivery_id).await;
                        return;
                    }
                },
            };

            // A task that slept until its own retry time may claim it even if
            // the wall clock lags the timer slightly.
            let now = match not_before {
                Some(at) => Utc::now().max(at),
                None => Utc::now(),
            };

            let Some(current) = self.load(delivery_id).await else {
                return;
            };

            // Resolve the webhook before claiming so a removed webhook does
            // not consume an attempt.
            let webhook = match self.registry.get(&current.webhook_id).await {
                Ok(webhook) => Ok(webhook),
                Err(Error::WebhookNotFound(_)) => {
                    drop(permit);
                    self.abandon(&current, now).await;
                    return;
                }
                Err(e) => Err(e),
            };

            let Some(delivery) = self.claim(delivery_id, now).await else {
                return;
            };

            let outcome = match webhook {
                Ok(webhook) => self.send(&delivery, &webhook).await,
                Err(e) => AttemptOutcome::failed(0, None, format!("webhook lookup failed: {}", e)),
            };
            drop(permit);

            let Some(next_retry_at) = self.record(&delivery, outcome).await else {
                return;
            };

            let wait = (next_retry_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    self.cancel(delivery_id).await;
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }
            not_before = Some(next_retry_at);
        }
    }

    async fn load(&self, id: &str) -> Option<Delivery> {
        match self.deliveries.get(id).await {
            Ok(Some(delivery)) => Some(delivery),
            Ok(None) => {
                warn!(delivery_id = %id, "delivery_record_missing");
                None
            }
            Err(e) => {
                error!(delivery_id = %id, error = %e, "delivery_load_failed");
                None
            }
        }
    }

    /// Claim the record for the next attempt.
    async fn claim(&self, id: &str, now: DateTime<Utc>) -> Option<Delivery> {
        match self.deliveries.update(id, &mut |d: &mut Delivery| d.begin_attempt(now)).await {
            Ok(Some(delivery)) => {
                debug!(
                    delivery_id = %id,
                    attempt = delivery.attempt,
                    max_attempts = delivery.max_attempts,
                    "delivery_claimed"
                );
                Some(delivery)
            }
            Ok(None) => {
                debug!(delivery_id = %id, "delivery_claim_skipped");
                None
            }
            Err(e) => {
                error!(delivery_id = %id, error = %e, "delivery_claim_failed");
                None
            }
        }
    }

    /// Perform a single HTTP attempt.
    async fn send(&self, delivery: &Delivery, webhook: &Webhook) -> AttemptOutcome {
        let body = match serde_json::to_vec(&delivery.event) {
            Ok(body) => body,
            Err(e) => return AttemptOutcome::failed(0, None, format!("failed to encode event: {}", e)),
        };

        let timeout = delivery.timeout();
        let mut request = self
            .client
            .post(&delivery.url)
            .timeout(timeout)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, self.user_agent.as_str())
            .header(HEADER_EVENT, delivery.event_type.as_str())
            .header(HEADER_ID, delivery.event_id.as_str())
            .header(HEADER_TIMESTAMP, Utc::now().timestamp().to_string());

        if let Some(secret) = webhook.signing_secret() {
            request = request.header(HEADER_SIGNATURE, signature::sign(&body, secret));
        }

        for (name, value) in &webhook.headers {
            if is_reserved_header(name) {
                warn!(
                    delivery_id = %delivery.id,
                    webhook_id = %webhook.id,
                    header = %name,
                    "delivery_reserved_header_skipped"
                );
                continue;
            }
            request = request.header(name.as_str(), value.as_str());
        }

        info!(
            delivery_id = %delivery.id,
            webhook_id = %delivery.webhook_id,
            event_id = %delivery.event_id,
            url = %delivery.url,
            attempt = delivery.attempt,
            max_attempts = delivery.max_attempts,
            body_length = body.len(),
            "delivery_attempt_starting"
        );

        let start = Instant::now();
        match request.body(body).send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = read_body(resp, self.response_body_limit).await;

                debug!(
                    delivery_id = %delivery.id,
                    status_code = status,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "delivery_response_received"
                );

                if (200..300).contains(&status) {
                    AttemptOutcome::delivered(status, body)
                } else {
                    AttemptOutcome::failed(status, body, format!("HTTP {}", status))
                }
            }
            Err(e) => {
                let message = if e.is_timeout() {
                    format!("request timed out after {}ms", timeout.as_millis())
                } else if e.is_connect() {
                    format!("connection failed: {}", e)
                } else {
                    e.to_string()
                };
                AttemptOutcome::failed(0, None, message)
            }
        }
    }

    /// Store the outcome of an attempt. Returns the next retry time, if any.
    async fn record(&self, delivery: &Delivery, outcome: AttemptOutcome) -> Option<DateTime<Utc>> {
        let mut next_retry_at = None;

        let result = self
            .deliveries
            .update(&delivery.id, &mut |d: &mut Delivery| {
                if d.status != DeliveryStatus::Sending {
                    return false;
                }
                let now = Utc::now();
                if outcome.success {
                    d.record_success(outcome.status_code, outcome.body.clone(), now);
                } else {
                    next_retry_at = d.record_failure(
                        outcome.status_code,
                        outcome.body.clone(),
                        outcome.error.clone().unwrap_or_default(),
                        now,
                    );
                }
                true
            })
            .await;

        let updated = match result {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                warn!(delivery_id = %delivery.id, "delivery_outcome_discarded");
                return None;
            }
            Err(e) => {
                error!(delivery_id = %delivery.id, error = %e, "delivery_outcome_store_failed");
                return None;
            }
        };

        match updated.status {
            DeliveryStatus::Delivered => info!(
                delivery_id = %updated.id,
                webhook_id = %updated.webhook_id,
                event_id = %updated.event_id,
                status_code = updated.response_code,
                attempt = updated.attempt,
                "delivery_succeeded"
            ),
            DeliveryStatus::Retrying => warn!(
                delivery_id = %updated.id,
                webhook_id = %updated.webhook_id,
                status_code = updated.response_code,
                error = ?updated.last_error,
                attempt = updated.attempt,
                max_attempts = updated.max_attempts,
                next_retry_at = ?updated.next_retry_at,
                "delivery_attempt_failed"
            ),
            _ => error!(
                delivery_id = %updated.id,
                webhook_id = %updated.webhook_id,
                status_code = updated.response_code,
                error = ?updated.last_error,
                attempts = updated.attempt,
                "delivery_exhausted"
            ),
        }

        next_retry_at
    }

    async fn cancel(&self, id: &str) {
        match self.deliveries.update(id, &mut |d: &mut Delivery| d.cancel(Utc::now())).await {
            Ok(Some(d)) => warn!(
                delivery_id = %id,
                attempt = d.attempt,
                max_attempts = d.max_attempts,
                "delivery_cancelled"
            ),
            Ok(None) => {}
            Err(e) => error!(delivery_id = %id, error = %e, "delivery_cancel_failed"),
        }
    }

    /// Finalize a claimable record whose webhook is gone. `attempt` is untouched.
    async fn abandon(&self, delivery: &Delivery, now: DateTime<Utc>) {
        let result = self
            .deliveries
            .update(&delivery.id, &mut |d: &mut Delivery| {
                if !d.is_claimable(now) {
                    return false;
                }
                d.abandon(now);
                true
            })
            .await;

        match result {
            Ok(Some(d)) => warn!(
                delivery_id = %d.id,
                webhook_id = %d.webhook_id,
                attempts = d.attempt,
                "delivery_abandoned_webhook_removed"
            ),
            Ok(None) => {}
            Err(e) => error!(delivery_id = %delivery.id, error = %e, "delivery_abandon_failed"),
        }
    }
}

/// Read at most `limit` bytes of the response body.
async fn read_body(mut resp: Response, limit: usize) -> Option<String> {
    if limit == 0 {
        return None;
    }

    let mut buf = Vec::new();
    loop {
        match resp.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(limit - buf.len());
                buf.extend_from_slice(&chunk[..take]);
                if buf.len() >= limit {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "delivery_response_body_read_failed");
                break;
            }
        }
    }

    if buf.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(&buf).into_owned())
    }
}
