//! ExporterConfig - Config Loader output
//!
//! Log level, delivery tuning, routes and receivers.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::ReceiverConfig;

/// Complete exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExporterConfig {
    /// Log level (`trace` / `debug` / `info` / `warn` / `error`)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Delivery defaults shared by all receivers
    #[serde(default)]
    #[validate(nested)]
    pub dispatch: DispatchSettings,

    /// Ordered routing rules
    #[serde(default)]
    pub routes: Vec<RouteConfig>,

    /// Named destinations
    #[serde(default)]
    #[validate(nested)]
    pub receivers: Vec<ReceiverConfig>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dispatch: DispatchSettings::default(),
            routes: Vec::new(),
            receivers: Vec::new(),
        }
    }
}

/// Routing rule
///
/// Every selector is an anchored regular expression; unset selectors match
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Involved object kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Severity (`Normal` / `Warning`)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,

    /// Reporting component
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,

    /// Involved object labels, all must match
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Minimum occurrence count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_count: Option<u32>,

    /// Receiver names
    pub destinations: Vec<String>,
}

/// Delivery defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DispatchSettings {
    /// Per-destination queue capacity
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1, message = "queue_capacity must be > 0"))]
    pub queue_capacity: usize,

    /// Behaviour when a queue is full
    #[serde(default)]
    pub overflow: OverflowPolicy,

    #[serde(default)]
    #[validate(nested)]
    pub retry: RetryConfig,

    /// Upper bound of a single delivery attempt
    #[serde(default = "default_attempt_timeout_ms")]
    #[validate(range(min = 1, message = "attempt_timeout_ms must be > 0"))]
    pub attempt_timeout_ms: u64,

    /// Grace period for draining queues on shutdown
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_attempt_timeout_ms() -> u64 {
    10_000
}

fn default_drain_timeout_ms() -> u64 {
    10_000
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            overflow: OverflowPolicy::default(),
            retry: RetryConfig::default(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl DispatchSettings {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Effective settings for one receiver
    pub fn with_overrides(&self, overrides: Option<&DeliveryOverrides>) -> Self {
        let Some(o) = overrides else {
            return self.clone();
        };
        Self {
            queue_capacity: o.queue_capacity.unwrap_or(self.queue_capacity),
            overflow: o.overflow.clone().unwrap_or_else(|| self.overflow.clone()),
            retry: o.retry.clone().unwrap_or_else(|| self.retry.clone()),
            attempt_timeout_ms: o.attempt_timeout_ms.unwrap_or(self.attempt_timeout_ms),
            drain_timeout_ms: self.drain_timeout_ms,
        }
    }
}

/// Per-receiver delivery overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct DeliveryOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, message = "queue_capacity must be > 0"))]
    pub queue_capacity: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overflow: Option<OverflowPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub retry: Option<RetryConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, message = "attempt_timeout_ms must be > 0"))]
    pub attempt_timeout_ms: Option<u64>,
}

/// Queue overflow policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum OverflowPolicy {
    /// Wait for free space up to `timeout_ms`, then drop the new event
    Block { timeout_ms: u64 },
    /// Evict the oldest queued event
    #[default]
    DropOldest,
    /// Reject the new event
    DropNewest,
}

/// Retry policy for retryable delivery failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1, message = "max_attempts must be >= 1"))]
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Delay cap
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Random reduction factor in `[0.0, 0.5]`
    #[serde(default)]
    #[validate(range(min = 0.0, max = 0.5, message = "jitter must be within [0.0, 0.5]"))]
    pub jitter: f64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: 0.0,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_defaults() {
        let settings: DispatchSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.queue_capacity, 1024);
        assert_eq!(settings.overflow, OverflowPolicy::DropOldest);
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.attempt_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_overflow_policy_tagged() {
        let policy: OverflowPolicy =
            serde_json::from_str(r#"{"policy": "block", "timeout_ms": 250}"#).unwrap();
        assert_eq!(policy, OverflowPolicy::Block { timeout_ms: 250 });

        let policy: OverflowPolicy = serde_json::from_str(r#"{"policy": "drop_newest"}"#).unwrap();
        assert_eq!(policy, OverflowPolicy::DropNewest);
    }

    #[test]
    fn test_overrides_apply_per_receiver() {
        let defaults = DispatchSettings::default();
        let overrides = DeliveryOverrides {
            queue_capacity: Some(8),
            attempt_timeout_ms: Some(500),
            ..Default::default()
        };
        let effective = defaults.with_overrides(Some(&overrides));
        assert_eq!(effective.queue_capacity, 8);
        assert_eq!(effective.attempt_timeout_ms, 500);
        assert_eq!(effective.retry, defaults.retry);
        assert_eq!(defaults.with_overrides(None), defaults);
    }

    #[test]
    fn test_route_type_selector_rename() {
        let route: RouteConfig =
            serde_json::from_str(r#"{"type": "Warning", "destinations": ["a"]}"#).unwrap();
        assert_eq!(route.severity.as_deref(), Some("Warning"));
        assert!(route.namespace.is_none());
    }
}
