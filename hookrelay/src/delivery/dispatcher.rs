//! Event fan-out: one delivery record per matching subscriber.

use std::sync::Arc;

use tracing::{debug, info};

use super::DeliveryWorker;
use crate::error::Result;
use crate::store::{DeliveryRepository, WebhookRegistry};
use crate::types::{Delivery, Event};

pub struct Dispatcher {
    registry: WebhookRegistry,
    deliveries: Arc<dyn DeliveryRepository>,
    worker: Arc<DeliveryWorker>,
}

impl Dispatcher {
    pub fn new(
        registry: WebhookRegistry,
        deliveries: Arc<dyn DeliveryRepository>,
        worker: Arc<DeliveryWorker>,
    ) -> Self {
        Self {
            registry,
            deliveries,
            worker,
        }
    }

    /// Create and schedule a delivery for every active subscriber of the event.
    ///
    /// Returns the new delivery ids, in subscriber id order, once every record
    /// is stored. Delivery itself happens in the background.
    pub async fn dispatch(&self, event: &Event) -> Result<Vec<String>> {
        let subscribers = self.registry.matching_subscribers(&event.event_type).await?;
        if subscribers.is_empty() {
            debug!(
                event_id = %event.id,
                event_type = %event.event_type,
                "event_has_no_subscribers"
            );
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(subscribers.len());
        for webhook in &subscribers {
            let delivery = Delivery::new(webhook, event);
            ids.push(delivery.id.clone());
            self.deliveries.insert(delivery).await?;
        }

        for id in &ids {
            self.worker.schedule(id.clone());
        }

        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            deliveries = ids.len(),
            "event_dispatched"
        );

        Ok(ids)
    }
}
