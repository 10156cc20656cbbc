//! AwsSink - Kinesis / SQS / SNS publishing
//!
//! One request per event against the service's query or JSON API. Requests
//! are sent unsigned; credentials are expected to be handled by the endpoint
//! (VPC endpoint policy, sidecar proxy, local emulator).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use contracts::{
    ContractError, DeliveryError, DeliveryOutcome, Event, EventSink, KinesisConfig, SinkKind,
    SnsConfig, SqsConfig,
};
use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use serde_json::json;
use tracing::{debug, instrument};

use super::http;
use super::render_payload;
use crate::template::Layout;

const KINESIS_PUT_RECORD: &str = "Kinesis_20131202.PutRecord";
const SQS_SEND_MESSAGE: &str = "AmazonSQS.SendMessage";
const SNS_API_VERSION: &str = "2010-03-31";

/// Service-specific addressing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwsTarget {
    Kinesis { stream_name: String },
    Sqs { queue_url: String },
    Sns { topic_arn: String },
}

impl AwsTarget {
    fn kind(&self) -> SinkKind {
        match self {
            Self::Kinesis { .. } => SinkKind::Kinesis,
            Self::Sqs { .. } => SinkKind::Sqs,
            Self::Sns { .. } => SinkKind::Sns,
        }
    }

    fn service(&self) -> &'static str {
        match self {
            Self::Kinesis { .. } => "kinesis",
            Self::Sqs { .. } => "sqs",
            Self::Sns { .. } => "sns",
        }
    }
}

/// Sink publishing to an AWS messaging service
pub struct AwsSink {
    name: String,
    client: reqwest::Client,
    endpoint: Url,
    target: AwsTarget,
    layout: Option<Layout>,
    released: bool,
}

impl AwsSink {
    pub fn kinesis(name: impl Into<String>, config: &KinesisConfig) -> Result<Self, ContractError> {
        let target = AwsTarget::Kinesis {
            stream_name: config.stream_name.clone(),
        };
        Self::new(
            name.into(),
            target,
            &config.region,
            config.endpoint.as_deref(),
            config.layout.as_ref(),
        )
    }

    pub fn sqs(name: impl Into<String>, config: &SqsConfig) -> Result<Self, ContractError> {
        let target = AwsTarget::Sqs {
            queue_url: config.queue_url.clone(),
        };
        Self::new(
            name.into(),
            target,
            &config.region,
            config.endpoint.as_deref(),
            config.layout.as_ref(),
        )
    }

    pub fn sns(name: impl Into<String>, config: &SnsConfig) -> Result<Self, ContractError> {
        let target = AwsTarget::Sns {
            topic_arn: config.topic_arn.clone(),
        };
        Self::new(
            name.into(),
            target,
            &config.region,
            config.endpoint.as_deref(),
            config.layout.as_ref(),
        )
    }

    fn new(
        name: String,
        target: AwsTarget,
        region: &str,
        endpoint: Option<&str>,
        layout: Option<&serde_json::Value>,
    ) -> Result<Self, ContractError> {
        if region.trim().is_empty() {
            return Err(ContractError::sink_construction(&name, "region cannot be empty"));
        }
        let endpoint = match endpoint {
            Some(raw) => http::parse_url(&name, raw)?,
            None => http::parse_url(
                &name,
                &format!("https://{}.{}.amazonaws.com/", target.service(), region),
            )?,
        };
        let layout = layout
            .map(Layout::compile)
            .transpose()
            .map_err(|e| ContractError::sink_construction(&name, format!("layout: {e}")))?;

        Ok(Self {
            client: http::build_client(&name)?,
            name,
            endpoint,
            target,
            layout,
            released: false,
        })
    }

    pub fn target(&self) -> &AwsTarget {
        &self.target
    }

    async fn publish(&self, event: &Event) -> Result<(), DeliveryError> {
        if self.released {
            return Err(DeliveryError::Released);
        }
        let (_, payload) = render_payload(self.layout.as_ref(), event)?;
        let message = serde_json::to_string(&payload)?;

        let request = match &self.target {
            AwsTarget::Kinesis { stream_name } => {
                let body = json!({
                    "StreamName": stream_name,
                    "Data": STANDARD.encode(message.as_bytes()),
                    "PartitionKey": event.id(),
                });
                self.client
                    .post(self.endpoint.clone())
                    .header("X-Amz-Target", KINESIS_PUT_RECORD)
                    .header(CONTENT_TYPE, "application/x-amz-json-1.1")
                    .body(serde_json::to_vec(&body)?)
            }
            AwsTarget::Sqs { queue_url } => {
                let body = json!({
                    "QueueUrl": queue_url,
                    "MessageBody": message,
                });
                self.client
                    .post(self.endpoint.clone())
                    .header("X-Amz-Target", SQS_SEND_MESSAGE)
                    .header(CONTENT_TYPE, "application/x-amz-json-1.0")
                    .body(serde_json::to_vec(&body)?)
            }
            AwsTarget::Sns { topic_arn } => self.client.post(self.endpoint.clone()).form(&[
                ("Action", "Publish"),
                ("TopicArn", topic_arn.as_str()),
                ("Message", message.as_str()),
                ("Version", SNS_API_VERSION),
            ]),
        };

        http::send(request).await.map(|_| ()).map_err(reclassify)
    }
}

/// AWS reports throttling as HTTP 400 with an error code in the body
fn reclassify(err: DeliveryError) -> DeliveryError {
    match err {
        DeliveryError::Rejected { body, .. }
            if body.contains("Throttl") || body.contains("ProvisionedThroughputExceeded") =>
        {
            DeliveryError::throttled(body)
        }
        other => other,
    }
}

impl EventSink for AwsSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SinkKind {
        self.target.kind()
    }

    #[instrument(
        name = "aws_sink_deliver",
        skip(self, event),
        fields(sink = %self.name, service = self.target.service(), event_id = %event.id())
    )]
    async fn deliver(&mut self, event: &Event) -> DeliveryOutcome {
        self.publish(event).await.into()
    }

    async fn release(&mut self) -> Result<(), ContractError> {
        self.released = true;
        debug!(sink = %self.name, kind = %self.target.kind(), "AwsSink released");
        Ok(())
    }
}
