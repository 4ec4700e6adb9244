//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use hookrelay::{Config, Delivery, WebhookService};

/// Config tuned for tests: small pool, short grace.
pub fn test_config() -> Config {
    Config {
        worker_concurrency: 8,
        shutdown_grace: Duration::from_secs(2),
        ..Config::default()
    }
}

pub fn test_service() -> Arc<WebhookService> {
    Arc::new(WebhookService::new(&test_config()).expect("service"))
}

/// Poll a delivery until `done` holds, failing the test after five seconds.
pub async fn wait_for<F>(service: &WebhookService, id: &str, done: F) -> Delivery
where
    F: Fn(&Delivery) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let delivery = service.get_delivery(id).await.expect("delivery exists");
        if done(&delivery) {
            return delivery;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("delivery {} never reached expected state: {:?}", id, delivery);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
