//! SinkFactory - receiver configuration to live sink

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use contracts::{Destination, ReceiverConfig};
use tracing::{debug, instrument};

use crate::error::DispatcherError;
use crate::sinks::{
    AwsSink, BuiltSink, ElasticsearchSink, FileSink, InMemorySink, InMemoryStore, OpsgenieSink,
    SlackSink, WebhookSink,
};

/// Builds sinks from receiver configuration
///
/// In-memory stores are registered by receiver name so callers can inspect
/// what was delivered.
#[derive(Debug, Clone, Default)]
pub struct SinkFactory {
    stores: Arc<Mutex<HashMap<String, InMemoryStore>>>,
}

impl SinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store backing the in-memory receiver `name`, if one was built
    pub fn in_memory_store(&self, name: &str) -> Option<InMemoryStore> {
        self.stores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Construct the sink for one receiver
    ///
    /// Connection setup is lazy; only configuration problems fail here.
    #[instrument(
        name = "sink_factory_build",
        skip(self, receiver),
        fields(sink = %receiver.name)
    )]
    pub fn build(&self, receiver: &ReceiverConfig) -> Result<BuiltSink, DispatcherError> {
        let name = receiver.name.as_str();
        let creation = |e: contracts::ContractError| DispatcherError::sink_creation(name, e.to_string());

        let destination = receiver.destination().map_err(creation)?;
        debug!(kind = %destination.kind(), "Building sink");

        let sink = match &destination {
            Destination::InMemory(_) => {
                let store = self
                    .stores
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(name.to_string())
                    .or_default()
                    .clone();
                BuiltSink::InMemory(InMemorySink::new(name, store))
            }
            Destination::Webhook(config) => {
                BuiltSink::Webhook(WebhookSink::new(name, config).map_err(creation)?)
            }
            Destination::File(config) => {
                BuiltSink::File(FileSink::new(name, config).map_err(creation)?)
            }
            Destination::Elasticsearch(config) => {
                BuiltSink::Elasticsearch(ElasticsearchSink::new(name, config).map_err(creation)?)
            }
            Destination::Kinesis(config) => {
                BuiltSink::Aws(AwsSink::kinesis(name, config).map_err(creation)?)
            }
            Destination::Sqs(config) => BuiltSink::Aws(AwsSink::sqs(name, config).map_err(creation)?),
            Destination::Sns(config) => BuiltSink::Aws(AwsSink::sns(name, config).map_err(creation)?),
            Destination::Opsgenie(config) => {
                BuiltSink::Opsgenie(OpsgenieSink::new(name, config).map_err(creation)?)
            }
            Destination::Slack(config) => {
                BuiltSink::Slack(SlackSink::new(name, config).map_err(creation)?)
            }
        };
        Ok(sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        ElasticsearchConfig, EventSink, FileConfig, InMemoryConfig, KinesisConfig, OpsgenieConfig,
        SinkKind, SlackConfig, SnsConfig, SqsConfig, WebhookConfig,
    };

    #[test]
    fn test_build_in_memory_registers_store() {
        let factory = SinkFactory::new();
        let receiver = ReceiverConfig::new("mem", Destination::InMemory(InMemoryConfig {}));
        let sink = factory.build(&receiver).unwrap();
        assert_eq!(sink.kind(), SinkKind::InMemory);
        assert_eq!(sink.name(), "mem");
        assert!(factory.in_memory_store("mem").is_some());
        assert!(factory.in_memory_store("other").is_none());
    }

    #[test]
    fn test_build_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileConfig {
            path: dir.path().join("events.log").display().to_string(),
            max_size_bytes: 1024,
            max_backups: 1,
            layout: None,
        };
        let sink = factory_build(ReceiverConfig::new("file-a", Destination::File(config))).unwrap();
        assert_eq!(sink.kind(), SinkKind::File);
    }

    #[test]
    fn test_missing_destination_fails() {
        let receiver = ReceiverConfig {
            name: "empty".into(),
            ..Default::default()
        };
        let err = factory_build(receiver).err().unwrap();
        assert!(matches!(err, DispatcherError::SinkCreation { ref name, .. } if name == "empty"));
    }

    #[test]
    fn test_bad_endpoint_fails() {
        let config = WebhookConfig {
            endpoint: "::not a url".into(),
            method: "POST".into(),
            headers: Default::default(),
            layout: None,
        };
        let err = factory_build(ReceiverConfig::new("hook", Destination::Webhook(config)))
            .err()
            .unwrap();
        assert!(err.to_string().contains("hook"));
    }

    #[test]
    fn test_every_destination_builds_matching_kind() {
        let dir = tempfile::tempdir().unwrap();
        let destinations = vec![
            Destination::InMemory(InMemoryConfig {}),
            Destination::Webhook(WebhookConfig {
                endpoint: "http://localhost:8080/hook".into(),
                method: "POST".into(),
                headers: Default::default(),
                layout: None,
            }),
            Destination::File(FileConfig {
                path: dir.path().join("events.log").display().to_string(),
                max_size_bytes: 1024,
                max_backups: 1,
                layout: None,
            }),
            Destination::Elasticsearch(ElasticsearchConfig {
                hosts: vec!["http://localhost:9200".into()],
                index: "kube-events".into(),
                index_format: None,
                username: None,
                password: None,
                api_key: None,
                use_event_id: false,
                layout: None,
            }),
            Destination::Kinesis(KinesisConfig {
                stream_name: "events".into(),
                region: "us-east-1".into(),
                endpoint: None,
                layout: None,
            }),
            Destination::Sqs(SqsConfig {
                queue_url: "https://sqs.us-east-1.amazonaws.com/1/q".into(),
                region: "us-east-1".into(),
                endpoint: None,
                layout: None,
            }),
            Destination::Sns(SnsConfig {
                topic_arn: "arn:aws:sns:us-east-1:1:t".into(),
                region: "us-east-1".into(),
                endpoint: None,
                layout: None,
            }),
            Destination::Opsgenie(OpsgenieConfig {
                api_key: "key".into(),
                url: "https://api.opsgenie.com".into(),
                priority: Some("P3".into()),
                message: "{{ .Message }}".into(),
                alias: None,
                description: None,
                tags: vec![],
            }),
            Destination::Slack(SlackConfig {
                token: "xoxb-token".into(),
                channel: "#alerts".into(),
                message: "{{ .Reason }}".into(),
                fields: Default::default(),
                url: "https://slack.com/api/chat.postMessage".into(),
            }),
        ];

        let factory = SinkFactory::new();
        for (i, destination) in destinations.into_iter().enumerate() {
            let name = format!("dest-{i}");
            let expected = destination.kind();
            let receiver = ReceiverConfig::new(name.clone(), destination);
            let sink = factory.build(&receiver).unwrap();
            assert_eq!(sink.kind(), expected, "receiver {name}");
            assert_eq!(sink.name(), name);
        }
    }

    #[test]
    fn test_two_destinations_on_one_receiver_fails() {
        let receiver = ReceiverConfig {
            name: "both".into(),
            in_memory: Some(InMemoryConfig {}),
            webhook: Some(WebhookConfig {
                endpoint: "http://localhost:8080/hook".into(),
                method: "POST".into(),
                headers: Default::default(),
                layout: None,
            }),
            ..Default::default()
        };
        let err = factory_build(receiver).err().unwrap();
        assert!(matches!(err, DispatcherError::SinkCreation { ref name, .. } if name == "both"));
    }

    fn factory_build(receiver: ReceiverConfig) -> Result<BuiltSink, DispatcherError> {
        SinkFactory::new().build(&receiver)
    }
}
