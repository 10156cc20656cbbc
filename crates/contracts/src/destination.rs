//! Receiver / destination configuration
//!
//! A receiver is a named destination with exactly one kind-specific payload.
//! [`ReceiverConfig`] is the serde-facing record; [`Destination`] is the
//! closed sum type the sink factory matches on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{ContractError, DeliveryOverrides, SinkKind};

/// Named receiver as written in the configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ReceiverConfig {
    /// Routing key
    #[validate(length(min = 1, message = "receiver name cannot be empty"))]
    pub name: String,

    /// Test-only in-process sink
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub in_memory: Option<InMemoryConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub webhook: Option<WebhookConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub file: Option<FileConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub elasticsearch: Option<ElasticsearchConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub kinesis: Option<KinesisConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub sqs: Option<SqsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub sns: Option<SnsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub opsgenie: Option<OpsgenieConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub slack: Option<SlackConfig>,

    /// Per-destination delivery tuning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub delivery: Option<DeliveryOverrides>,
}

/// Destination payload, exactly one kind
#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    InMemory(InMemoryConfig),
    Webhook(WebhookConfig),
    File(FileConfig),
    Elasticsearch(ElasticsearchConfig),
    Kinesis(KinesisConfig),
    Sqs(SqsConfig),
    Sns(SnsConfig),
    Opsgenie(OpsgenieConfig),
    Slack(SlackConfig),
}

impl Destination {
    pub fn kind(&self) -> SinkKind {
        match self {
            Self::InMemory(_) => SinkKind::InMemory,
            Self::Webhook(_) => SinkKind::Webhook,
            Self::File(_) => SinkKind::File,
            Self::Elasticsearch(_) => SinkKind::Elasticsearch,
            Self::Kinesis(_) => SinkKind::Kinesis,
            Self::Sqs(_) => SinkKind::Sqs,
            Self::Sns(_) => SinkKind::Sns,
            Self::Opsgenie(_) => SinkKind::Opsgenie,
            Self::Slack(_) => SinkKind::Slack,
        }
    }
}

impl ReceiverConfig {
    /// Create a receiver from a name and a destination payload
    pub fn new(name: impl Into<String>, destination: Destination) -> Self {
        let mut receiver = Self {
            name: name.into(),
            ..Default::default()
        };
        match destination {
            Destination::InMemory(c) => receiver.in_memory = Some(c),
            Destination::Webhook(c) => receiver.webhook = Some(c),
            Destination::File(c) => receiver.file = Some(c),
            Destination::Elasticsearch(c) => receiver.elasticsearch = Some(c),
            Destination::Kinesis(c) => receiver.kinesis = Some(c),
            Destination::Sqs(c) => receiver.sqs = Some(c),
            Destination::Sns(c) => receiver.sns = Some(c),
            Destination::Opsgenie(c) => receiver.opsgenie = Some(c),
            Destination::Slack(c) => receiver.slack = Some(c),
        }
        receiver
    }

    /// Resolve the populated payload
    ///
    /// # Errors
    /// - `UnknownDestination` when no payload is set
    /// - `ConflictingDestinations` when more than one is set
    pub fn destination(&self) -> Result<Destination, ContractError> {
        let mut populated: Vec<Destination> = Vec::with_capacity(1);
        if let Some(c) = &self.in_memory {
            populated.push(Destination::InMemory(c.clone()));
        }
        if let Some(c) = &self.webhook {
            populated.push(Destination::Webhook(c.clone()));
        }
        if let Some(c) = &self.file {
            populated.push(Destination::File(c.clone()));
        }
        if let Some(c) = &self.elasticsearch {
            populated.push(Destination::Elasticsearch(c.clone()));
        }
        if let Some(c) = &self.kinesis {
            populated.push(Destination::Kinesis(c.clone()));
        }
        if let Some(c) = &self.sqs {
            populated.push(Destination::Sqs(c.clone()));
        }
        if let Some(c) = &self.sns {
            populated.push(Destination::Sns(c.clone()));
        }
        if let Some(c) = &self.opsgenie {
            populated.push(Destination::Opsgenie(c.clone()));
        }
        if let Some(c) = &self.slack {
            populated.push(Destination::Slack(c.clone()));
        }

        match populated.len() {
            0 => Err(ContractError::UnknownDestination {
                receiver: self.name.clone(),
            }),
            1 => Ok(populated.remove(0)),
            _ => Err(ContractError::ConflictingDestinations {
                receiver: self.name.clone(),
                kinds: populated.iter().map(|d| d.kind().as_str()).collect(),
            }),
        }
    }
}

/// In-process sink that keeps every event
///
/// For tests only: retention is unbounded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct InMemoryConfig {}

/// HTTP webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct WebhookConfig {
    /// Target URL
    #[validate(url(message = "webhook endpoint must be a valid URL"))]
    pub endpoint: String,

    /// HTTP method
    #[serde(default = "default_webhook_method")]
    pub method: String,

    /// Extra request headers (values are templates)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// JSON body layout (string leaves are templates)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<serde_json::Value>,
}

fn default_webhook_method() -> String {
    "POST".to_string()
}

/// Append-only JSON lines file with rotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct FileConfig {
    /// Output file path
    #[validate(length(min = 1, message = "file path cannot be empty"))]
    pub path: String,

    /// Rotate once the file would grow past this size
    #[serde(default = "default_max_size_bytes")]
    #[validate(range(min = 1, message = "max_size_bytes must be > 0"))]
    pub max_size_bytes: u64,

    /// Number of rotated files to keep
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<serde_json::Value>,
}

fn default_max_size_bytes() -> u64 {
    100 * 1024 * 1024
}

fn default_max_backups() -> usize {
    3
}

/// Elasticsearch / OpenSearch bulk indexing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ElasticsearchConfig {
    /// Cluster base URLs, the first is used
    #[validate(length(min = 1, message = "at least one host is required"))]
    pub hosts: Vec<String>,

    /// Index name
    #[validate(length(min = 1, message = "index cannot be empty"))]
    pub index: String,

    /// Date suffix in chrono format (e.g. `%Y.%m.%d`), appended as `<index>-<date>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Use the event uid as document id
    #[serde(default)]
    pub use_event_id: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<serde_json::Value>,
}

/// Kinesis data stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct KinesisConfig {
    #[validate(length(min = 1, message = "stream_name cannot be empty"))]
    pub stream_name: String,

    #[validate(length(min = 1, message = "region cannot be empty"))]
    pub region: String,

    /// Endpoint override (defaults to the regional AWS endpoint)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(url)]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<serde_json::Value>,
}

/// SQS queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SqsConfig {
    #[validate(url(message = "queue_url must be a valid URL"))]
    pub queue_url: String,

    #[validate(length(min = 1, message = "region cannot be empty"))]
    pub region: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(url)]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<serde_json::Value>,
}

/// SNS topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SnsConfig {
    #[validate(length(min = 1, message = "topic_arn cannot be empty"))]
    pub topic_arn: String,

    #[validate(length(min = 1, message = "region cannot be empty"))]
    pub region: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(url)]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<serde_json::Value>,
}

/// Opsgenie alert creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct OpsgenieConfig {
    #[validate(length(min = 1, message = "api_key cannot be empty"))]
    pub api_key: String,

    #[serde(default = "default_opsgenie_url")]
    #[validate(url)]
    pub url: String,

    /// `P1`..`P5`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,

    /// Alert message template
    #[validate(length(min = 1, message = "message cannot be empty"))]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

fn default_opsgenie_url() -> String {
    "https://api.opsgenie.com".to_string()
}

/// Slack `chat.postMessage`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SlackConfig {
    #[validate(length(min = 1, message = "token cannot be empty"))]
    pub token: String,

    #[validate(length(min = 1, message = "channel cannot be empty"))]
    pub channel: String,

    /// Message template
    #[validate(length(min = 1, message = "message cannot be empty"))]
    pub message: String,

    /// Attachment fields (values are templates)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,

    #[serde(default = "default_slack_url")]
    #[validate(url)]
    pub url: String,
}

fn default_slack_url() -> String {
    "https://slack.com/api/chat.postMessage".to_string()
}
