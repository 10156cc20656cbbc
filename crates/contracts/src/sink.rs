//! EventSink trait - Dispatcher output interface
//!
//! Defines the abstract interface for destination sinks.

use std::fmt;

use crate::{ContractError, DeliveryError, Event};

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Destination accepted the event
    Delivered,
    /// Transient failure, the worker may retry
    Retryable(String),
    /// Permanent failure, the event is dropped
    Fatal(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

impl From<Result<(), DeliveryError>> for DeliveryOutcome {
    fn from(result: Result<(), DeliveryError>) -> Self {
        match result {
            Ok(()) => Self::Delivered,
            Err(e) if e.is_retryable() => Self::Retryable(e.to_string()),
            Err(e) => Self::Fatal(e.to_string()),
        }
    }
}

/// Destination kind, one per configuration payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    InMemory,
    Webhook,
    File,
    Elasticsearch,
    Kinesis,
    Sqs,
    Sns,
    Opsgenie,
    Slack,
}

impl SinkKind {
    /// Configuration key of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InMemory => "in_memory",
            Self::Webhook => "webhook",
            Self::File => "file",
            Self::Elasticsearch => "elasticsearch",
            Self::Kinesis => "kinesis",
            Self::Sqs => "sqs",
            Self::Sns => "sns",
            Self::Opsgenie => "opsgenie",
            Self::Slack => "slack",
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event delivery trait
///
/// All destination implementations must implement this trait. A sink is
/// owned by exactly one delivery worker.
#[trait_variant::make(EventSink: Send)]
pub trait LocalEventSink {
    /// Destination name (routing key, used for logging/metrics)
    fn name(&self) -> &str;

    /// Destination kind
    fn kind(&self) -> SinkKind;

    /// Attempt delivery of one event
    ///
    /// Implementations classify their own failures; the caller bounds the
    /// attempt with a timeout.
    async fn deliver(&mut self, event: &Event) -> DeliveryOutcome;

    /// Release held resources
    ///
    /// Must be idempotent and safe after partial failures.
    async fn release(&mut self) -> Result<(), ContractError>;
}
