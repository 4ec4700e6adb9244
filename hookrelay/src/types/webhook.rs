//! Subscriber registration type.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Subscription marker that matches every event type.
pub const WILDCARD_EVENT: &str = "*";

/// Header names set by the delivery worker. Custom headers may not use them.
pub const RESERVED_HEADERS: &[&str] = &[
    "content-type",
    "user-agent",
    "x-webhook-event",
    "x-webhook-id",
    "x-webhook-timestamp",
    "x-webhook-signature",
];

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 60_000;

/// Delivery policy applied when a registration leaves it unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebhookDefaults {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for WebhookDefaults {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

/// A registered subscriber endpoint and its delivery policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    /// Opaque identity, assigned on registration when empty
    #[serde(default)]
    pub id: String,
    /// Target URL receiving the POST
    pub url: String,
    /// Subscribed event types in registration order
    pub events: Vec<String>,
    /// Shared secret used for signing; `None` disables signing
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Extra headers added to every delivery
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Hard deadline for a single attempt
    pub timeout_ms: u64,
    /// Number of attempts a delivery gets (at least one)
    pub max_retries: u32,
    /// Base delay scaled by the attempt number between retries
    pub retry_delay_ms: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl Webhook {
    /// Create an active webhook with default delivery policy.
    pub fn new(url: impl Into<String>, events: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            url: url.into(),
            events,
            secret: None,
            active: true,
            headers: HashMap::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Attempts granted to each delivery. Zero retries still means one send.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Returns the signing secret when one is configured and non-empty.
    pub fn signing_secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }

    /// Check whether this webhook should receive an event of the given type.
    pub fn matches(&self, event_type: &str) -> bool {
        self.active
            && self
                .events
                .iter()
                .any(|e| e == WILDCARD_EVENT || e == event_type)
    }

    /// Validate the registration and normalize the subscription set.
    ///
    /// Duplicate event types are dropped, keeping the first occurrence.
    pub fn validate(&mut self) -> Result<()> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(Error::InvalidWebhook("url is required".to_string()));
        }

        let parsed = Url::parse(url)
            .map_err(|e| Error::InvalidWebhook(format!("url {:?} is invalid: {}", url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::InvalidWebhook(format!(
                "url scheme {:?} is not supported",
                parsed.scheme()
            )));
        }
        self.url = url.to_string();

        if self.retry_delay_ms == 0 {
            return Err(Error::InvalidWebhook(
                "retry delay must be greater than zero".to_string(),
            ));
        }

        if self.timeout_ms == 0 {
            return Err(Error::InvalidWebhook(
                "timeout must be greater than zero".to_string(),
            ));
        }

        for (name, value) in &self.headers {
            if is_reserved_header(name) {
                return Err(Error::InvalidWebhook(format!("header {:?} is reserved", name)));
            }
            if HeaderName::from_bytes(name.as_bytes()).is_err() {
                return Err(Error::InvalidWebhook(format!(
                    "header name {:?} is not a valid HTTP header name",
                    name
                )));
            }
            if HeaderValue::from_str(value).is_err() {
                return Err(Error::InvalidWebhook(format!(
                    "value of header {:?} is not a valid HTTP header value",
                    name
                )));
            }
        }

        let mut seen = Vec::with_capacity(self.events.len());
        for event in self.events.drain(..) {
            let event = event.trim().to_string();
            if !event.is_empty() && !seen.contains(&event) {
                seen.push(event);
            }
        }
        self.events = seen;

        Ok(())
    }
}

/// Check a header name against the reserved delivery headers (case-insensitive).
pub fn is_reserved_header(name: &str) -> bool {
    RESERVED_HEADERS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name.trim()))
}
