//! Sink implementations
//!
//! One module per destination kind. [`BuiltSink`] is what the factory hands
//! to a delivery worker.

mod aws;
mod elasticsearch;
mod file;
mod http;
mod in_memory;
mod opsgenie;
mod slack;
mod webhook;

use contracts::{ContractError, DeliveryError, DeliveryOutcome, Event, EventSink, SinkKind};
use serde_json::Value;

use crate::template::{Layout, event_context};

pub use self::aws::{AwsSink, AwsTarget};
pub use self::elasticsearch::ElasticsearchSink;
pub use self::file::FileSink;
pub use self::in_memory::{InMemorySink, InMemoryStore};
pub use self::opsgenie::OpsgenieSink;
pub use self::slack::SlackSink;
pub use self::webhook::WebhookSink;

/// Template context and rendered body for one event
///
/// Without a layout the body is the event's JSON form.
pub(crate) fn render_payload(
    layout: Option<&Layout>,
    event: &Event,
) -> Result<(Value, Value), DeliveryError> {
    let context = event_context(event)?;
    let body = match layout {
        Some(layout) => layout.render(&context),
        None => context.clone(),
    };
    Ok((context, body))
}

/// Any sink the factory can construct
pub enum BuiltSink {
    InMemory(InMemorySink),
    Webhook(WebhookSink),
    File(FileSink),
    Elasticsearch(ElasticsearchSink),
    Aws(AwsSink),
    Opsgenie(OpsgenieSink),
    Slack(SlackSink),
}

impl EventSink for BuiltSink {
    fn name(&self) -> &str {
        match self {
            Self::InMemory(s) => s.name(),
            Self::Webhook(s) => s.name(),
            Self::File(s) => s.name(),
            Self::Elasticsearch(s) => s.name(),
            Self::Aws(s) => s.name(),
            Self::Opsgenie(s) => s.name(),
            Self::Slack(s) => s.name(),
        }
    }

    fn kind(&self) -> SinkKind {
        match self {
            Self::InMemory(s) => s.kind(),
            Self::Webhook(s) => s.kind(),
            Self::File(s) => s.kind(),
            Self::Elasticsearch(s) => s.kind(),
            Self::Aws(s) => s.kind(),
            Self::Opsgenie(s) => s.kind(),
            Self::Slack(s) => s.kind(),
        }
    }

    async fn deliver(&mut self, event: &Event) -> DeliveryOutcome {
        match self {
            Self::InMemory(s) => s.deliver(event).await,
            Self::Webhook(s) => s.deliver(event).await,
            Self::File(s) => s.deliver(event).await,
            Self::Elasticsearch(s) => s.deliver(event).await,
            Self::Aws(s) => s.deliver(event).await,
            Self::Opsgenie(s) => s.deliver(event).await,
            Self::Slack(s) => s.deliver(event).await,
        }
    }

    async fn release(&mut self) -> Result<(), ContractError> {
        match self {
            Self::InMemory(s) => s.release().await,
            Self::Webhook(s) => s.release().await,
            Self::File(s) => s.release().await,
            Self::Elasticsearch(s) => s.release().await,
            Self::Aws(s) => s.release().await,
            Self::Opsgenie(s) => s.release().await,
            Self::Slack(s) => s.release().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_payload_defaults_to_event_json() {
        let event = Event {
            reason: "Pulled".into(),
            ..Default::default()
        };
        let (context, body) = render_payload(None, &event).unwrap();
        assert_eq!(context, body);
        assert_eq!(body["reason"], "Pulled");

        let layout = Layout::compile(&json!({ "r": "{{ .reason }}", "n": 1 })).unwrap();
        let (_, body) = render_payload(Some(&layout), &event).unwrap();
        assert_eq!(body, json!({ "r": "Pulled", "n": 1 }));
    }

    #[tokio::test]
    async fn test_built_sink_delegates() {
        let store = InMemoryStore::new();
        let mut sink = BuiltSink::InMemory(InMemorySink::new("mem", store.clone()));
        assert_eq!(sink.name(), "mem");
        assert_eq!(sink.kind(), SinkKind::InMemory);
        assert!(sink.deliver(&Event::default()).await.is_delivered());
        sink.release().await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.release_count(), 1);
    }
}
