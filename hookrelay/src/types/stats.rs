//! Aggregated delivery counts for operational visibility.

use serde::Serialize;

use super::{Delivery, DeliveryStatus};

/// Delivery counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    pub total: usize,
    pub pending: usize,
    pub sending: usize,
    pub retrying: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl DeliveryStats {
    /// Tally a set of deliveries.
    pub fn from_deliveries<'a>(deliveries: impl IntoIterator<Item = &'a Delivery>) -> Self {
        let mut stats = Self::default();
        for delivery in deliveries {
            stats.record(delivery.status);
        }
        stats
    }

    pub fn record(&mut self, status: DeliveryStatus) {
        self.total += 1;
        match status {
            DeliveryStatus::Pending => self.pending += 1,
            DeliveryStatus::Sending => self.sending += 1,
            DeliveryStatus::Retrying => self.retrying += 1,
            DeliveryStatus::Delivered => self.delivered += 1,
            DeliveryStatus::Failed => self.failed += 1,
        }
    }

    /// Share of finished deliveries that succeeded, 0.0 when none finished.
    pub fn success_rate(&self) -> f64 {
        let finished = self.delivered + self.failed;
        if finished == 0 {
            0.0
        } else {
            self.delivered as f64 / finished as f64
        }
    }
}

/// Per-webhook statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookStats {
    pub webhook_id: String,
    #[serde(flatten)]
    pub deliveries: DeliveryStats,
    pub success_rate: f64,
}

impl WebhookStats {
    pub fn new(webhook_id: impl Into<String>, deliveries: DeliveryStats) -> Self {
        let success_rate = deliveries.success_rate();
        Self {
            webhook_id: webhook_id.into(),
            deliveries,
            success_rate,
        }
    }
}
