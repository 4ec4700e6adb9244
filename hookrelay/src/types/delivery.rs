//! Delivery record and its state machine.
//!
//! ```text
//! PENDING → SENDING → DELIVERED
//!              │  ↑
//!              ↓  │
//!           RETRYING → FAILED
//! ```
//!
//! Transitions are plain methods on [`Delivery`] so that every store applies
//! them the same way under its own write lock.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::delivery::retry;
use crate::types::{Event, Webhook};

/// Recorded as `last_error` when shutdown interrupts a waiting delivery.
pub const CANCELLED_MESSAGE: &str = "delivery cancelled before next attempt";

/// Recorded as `last_error` when the owning webhook disappears.
pub const WEBHOOK_REMOVED_MESSAGE: &str = "webhook is no longer registered";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sending,
    Retrying,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sending => "sending",
            DeliveryStatus::Retrying => "retrying",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }
}

/// Why a delivery ended in `FAILED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// Every attempt was used up
    Exhausted,
    /// Shutdown fired while the delivery was waiting
    Cancelled,
    /// The webhook was unregistered before the next attempt
    WebhookRemoved,
}

/// One event being delivered to one webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub id: String,
    pub webhook_id: String,
    pub event_id: String,
    pub event_type: String,
    /// Target URL copied at dispatch time
    pub url: String,
    pub status: DeliveryStatus,
    pub attempt: u32,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
    /// Last HTTP status, 0 when no response was received
    pub response_code: u16,
    pub response_body: Option<String>,
    pub last_error: Option<String>,
    pub failure_cause: Option<FailureCause>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub event: Event,
}

impl Delivery {
    /// Create a pending delivery, snapshotting the webhook's target and policy.
    pub fn new(webhook: &Webhook, event: &Event) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            webhook_id: webhook.id.clone(),
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            url: webhook.url.clone(),
            status: DeliveryStatus::Pending,
            attempt: 0,
            max_attempts: webhook.max_attempts(),
            retry_delay_ms: webhook.retry_delay_ms,
            timeout_ms: webhook.timeout_ms,
            response_code: 0,
            response_body: None,
            last_error: None,
            failure_cause: None,
            created_at: now,
            updated_at: now,
            next_retry_at: None,
            delivered_at: None,
            event: event.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            DeliveryStatus::Delivered | DeliveryStatus::Failed
        )
    }

    /// Whether a scheduled retry is due and attempts remain.
    ///
    /// Covers `RETRYING` records whose waiter is gone and `FAILED` records
    /// that were cancelled mid-wait.
    pub fn is_due_for_retry(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.status,
            DeliveryStatus::Retrying | DeliveryStatus::Failed
        ) && self.attempt < self.max_attempts
            && self.next_retry_at.map(|at| at <= now).unwrap_or(false)
    }

    /// Whether an attempt may start now: a fresh record or a due retry.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.status == DeliveryStatus::Pending || self.is_due_for_retry(now)
    }

    /// Claim the record for a new attempt (`→ SENDING`).
    ///
    /// Returns `false` if the record is not claimable, e.g. another task
    /// already holds it or it has reached a terminal outcome.
    pub fn begin_attempt(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_claimable(now) {
            return false;
        }

        self.status = DeliveryStatus::Sending;
        self.attempt += 1;
        self.next_retry_at = None;
        self.failure_cause = None;
        self.updated_at = now;
        true
    }

    /// `SENDING → DELIVERED`.
    pub fn record_success(&mut self, code: u16, body: Option<String>, now: DateTime<Utc>) {
        self.status = DeliveryStatus::Delivered;
        self.response_code = code;
        self.response_body = body;
        self.last_error = None;
        self.failure_cause = None;
        self.next_retry_at = None;
        self.delivered_at = Some(now);
        self.updated_at = now;
    }

    /// `SENDING → RETRYING | FAILED`.
    ///
    /// Returns the time of the next attempt when one remains.
    pub fn record_failure(
        &mut self,
        code: u16,
        body: Option<String>,
        error: String,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        self.response_code = code;
        self.response_body = body;
        self.last_error = Some(error);
        self.updated_at = now;

        if self.attempt < self.max_attempts {
            let at = retry::next_retry_at(now, self.retry_delay(), self.attempt);
            self.status = DeliveryStatus::Retrying;
            self.next_retry_at = Some(at);
            Some(at)
        } else {
            self.status = DeliveryStatus::Failed;
            self.failure_cause = Some(FailureCause::Exhausted);
            self.next_retry_at = None;
            None
        }
    }

    /// Finalize a waiting delivery as cancelled.
    ///
    /// Only `PENDING` and `RETRYING` records are affected. `next_retry_at`
    /// is kept (or set to `now` for a pending record) so the sweeper can
    /// resume the delivery after a restart.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> bool {
        match self.status {
            DeliveryStatus::Pending | DeliveryStatus::Retrying => {
                self.status = DeliveryStatus::Failed;
                self.failure_cause = Some(FailureCause::Cancelled);
                self.last_error = Some(CANCELLED_MESSAGE.to_string());
                self.next_retry_at.get_or_insert(now);
                self.updated_at = now;
                true
            }
            _ => false,
        }
    }

    /// Finalize a delivery whose webhook was unregistered. Not resumable.
    pub fn abandon(&mut self, now: DateTime<Utc>) {
        self.status = DeliveryStatus::Failed;
        self.failure_cause = Some(FailureCause::WebhookRemoved);
        self.last_error = Some(WEBHOOK_REMOVED_MESSAGE.to_string());
        self.next_retry_at = None;
        self.updated_at = now;
    }
}
