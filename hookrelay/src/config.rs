//! Configuration module for environment variable parsing.
//!
//! Every setting has a default; unparsable values log a warning and fall
//! back to it rather than aborting startup.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::types::webhook::{
    WebhookDefaults, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_MS, DEFAULT_TIMEOUT_MS,
};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the delivery service (management API + event ingestion)
    pub port: u16,

    /// Port for the inbound webhook receiver
    pub receiver_port: u16,

    /// Service name used in the outbound User-Agent
    pub service_name: String,

    /// Maximum number of HTTP attempts in flight at once
    pub worker_concurrency: usize,

    /// How often the retry sweeper scans for due deliveries
    pub sweep_interval: Duration,

    /// How long delivered records are kept before being purged
    pub delivery_retention: Duration,

    /// Bytes of the subscriber's response body kept on the delivery record
    pub response_body_limit: usize,

    /// Upper bound on draining in-flight deliveries at shutdown
    pub shutdown_grace: Duration,

    // =========================================================================
    // Defaults applied to webhooks registered without explicit policy
    // =========================================================================

    pub default_timeout_ms: u64,

    pub default_max_retries: u32,

    pub default_retry_delay_ms: u64,

    // =========================================================================
    // Inbound receiver
    // =========================================================================

    /// Secret used to verify inbound `X-Webhook-Signature` headers
    pub inbound_secret: Option<String>,

    /// Accept unsigned inbound payloads when no secret is configured
    pub inbound_allow_unsigned: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            receiver_port: 8081,
            service_name: "HookRelay".to_string(),
            worker_concurrency: 100,
            sweep_interval: Duration::from_secs(30),
            delivery_retention: Duration::from_secs(168 * 3600),
            response_body_limit: 1024,
            shutdown_grace: Duration::from_secs(10),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            default_max_retries: DEFAULT_MAX_RETRIES,
            default_retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            inbound_secret: None,
            inbound_allow_unsigned: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            port: parse_var("PORT", defaults.port),

            receiver_port: parse_var("RECEIVER_PORT", defaults.receiver_port),

            service_name: env::var("SERVICE_NAME")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.service_name),

            worker_concurrency: parse_var("WORKER_CONCURRENCY", defaults.worker_concurrency)
                .max(1),

            sweep_interval: Duration::from_secs(
                parse_var("SWEEP_INTERVAL_SECS", defaults.sweep_interval.as_secs()).max(1),
            ),

            delivery_retention: Duration::from_secs(
                parse_var::<u64>("DELIVERY_RETENTION_HOURS", 168).saturating_mul(3600),
            ),

            response_body_limit: parse_var("RESPONSE_BODY_LIMIT", defaults.response_body_limit),

            shutdown_grace: Duration::from_secs(parse_var(
                "SHUTDOWN_GRACE_SECS",
                defaults.shutdown_grace.as_secs(),
            )),

            default_timeout_ms: parse_var("DEFAULT_TIMEOUT_MS", defaults.default_timeout_ms),

            default_max_retries: parse_var("DEFAULT_MAX_RETRIES", defaults.default_max_retries),

            default_retry_delay_ms: parse_var(
                "DEFAULT_RETRY_DELAY_MS",
                defaults.default_retry_delay_ms,
            ),

            inbound_secret: env::var("INBOUND_WEBHOOK_SECRET")
                .ok()
                .filter(|v| !v.trim().is_empty()),

            inbound_allow_unsigned: parse_bool(
                "INBOUND_ALLOW_UNSIGNED",
                defaults.inbound_allow_unsigned,
            ),
        }
    }

    /// Delivery policy for webhooks registered without one.
    pub fn webhook_defaults(&self) -> WebhookDefaults {
        WebhookDefaults {
            timeout_ms: self.default_timeout_ms.max(1),
            max_retries: self.default_max_retries,
            retry_delay_ms: self.default_retry_delay_ms.max(1),
        }
    }

    /// User-Agent sent with every delivery: `<service>-Webhook/<version>`.
    pub fn user_agent(&self) -> String {
        format!("{}-Webhook/{}", self.service_name, env!("CARGO_PKG_VERSION"))
    }
}

/// Parse a variable, falling back to `default` when unset or invalid.
fn parse_var<T: FromStr + Copy>(name: &str, default: T) -> T {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}

/// Parse a boolean flag such as "true", "1", "yes" or "false", "0", "no".
fn parse_bool(name: &str, default: bool) -> bool {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            warn!(env_var = name, value = %raw, "Invalid boolean, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_valid() {
        env::set_var("TEST_HOOKRELAY_PORT", "9090");
        assert_eq!(parse_var::<u16>("TEST_HOOKRELAY_PORT", 1), 9090);
        env::remove_var("TEST_HOOKRELAY_PORT");
    }

    #[test]
    fn test_parse_var_invalid_uses_default() {
        env::set_var("TEST_HOOKRELAY_BAD", "not-a-number");
        assert_eq!(parse_var::<u64>("TEST_HOOKRELAY_BAD", 42), 42);
        env::remove_var("TEST_HOOKRELAY_BAD");
    }

    #[test]
    fn test_parse_var_default() {
        assert_eq!(parse_var::<u32>("NONEXISTENT_HOOKRELAY_VAR", 7), 7);
    }

    #[test]
    fn test_parse_bool() {
        env::set_var("TEST_HOOKRELAY_FLAG", "Yes");
        assert!(parse_bool("TEST_HOOKRELAY_FLAG", false));
        env::set_var("TEST_HOOKRELAY_FLAG", "0");
        assert!(!parse_bool("TEST_HOOKRELAY_FLAG", true));
        env::set_var("TEST_HOOKRELAY_FLAG", "maybe");
        assert!(parse_bool("TEST_HOOKRELAY_FLAG", true));
        env::remove_var("TEST_HOOKRELAY_FLAG");
    }

    #[test]
    fn test_user_agent() {
        let config = Config::default();
        assert_eq!(
            config.user_agent(),
            format!("HookRelay-Webhook/{}", env!("CARGO_PKG_VERSION"))
        );
    }
}
