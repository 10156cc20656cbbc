//! WebhookSink - templated HTTP request per event

use contracts::{
    ContractError, DeliveryError, DeliveryOutcome, Event, EventSink, SinkKind, WebhookConfig,
};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Method, Url};
use tracing::{debug, instrument};

use super::http;
use super::render_payload;
use crate::template::{Layout, Template};

/// Sink that sends each event to an HTTP endpoint
pub struct WebhookSink {
    name: String,
    client: reqwest::Client,
    endpoint: Url,
    method: Method,
    headers: Vec<(HeaderName, Template)>,
    layout: Option<Layout>,
    released: bool,
}

impl WebhookSink {
    /// Create a new WebhookSink
    ///
    /// Validates the endpoint, method, header names and templates.
    pub fn new(name: impl Into<String>, config: &WebhookConfig) -> Result<Self, ContractError> {
        let name = name.into();
        let endpoint = http::parse_url(&name, &config.endpoint)?;
        let method = Method::from_bytes(config.method.to_uppercase().as_bytes()).map_err(|_| {
            ContractError::sink_construction(&name, format!("invalid method '{}'", config.method))
        })?;

        let headers = config
            .headers
            .iter()
            .map(|(key, value)| {
                let header = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                    ContractError::sink_construction(&name, format!("invalid header '{key}': {e}"))
                })?;
                let template = Template::parse(value).map_err(|e| {
                    ContractError::sink_construction(&name, format!("header '{key}': {e}"))
                })?;
                Ok((header, template))
            })
            .collect::<Result<Vec<_>, ContractError>>()?;

        let layout = config
            .layout
            .as_ref()
            .map(Layout::compile)
            .transpose()
            .map_err(|e| ContractError::sink_construction(&name, format!("layout: {e}")))?;

        Ok(Self {
            client: http::build_client(&name)?,
            name,
            endpoint,
            method,
            headers,
            layout,
            released: false,
        })
    }

    async fn send(&self, event: &Event) -> Result<(), DeliveryError> {
        if self.released {
            return Err(DeliveryError::Released);
        }
        let (context, body) = render_payload(self.layout.as_ref(), event)?;

        let mut request = self
            .client
            .request(self.method.clone(), self.endpoint.clone())
            .json(&body);
        for (header, template) in &self.headers {
            let value = HeaderValue::from_str(&template.render(&context)).map_err(|e| {
                DeliveryError::encode(format!("header '{header}' renders invalid value: {e}"))
            })?;
            request = request.header(header.clone(), value);
        }

        http::send(request).await?;
        Ok(())
    }
}

impl EventSink for WebhookSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Webhook
    }

    #[instrument(
        name = "webhook_sink_deliver",
        skip(self, event),
        fields(sink = %self.name, event_id = %event.id())
    )]
    async fn deliver(&mut self, event: &Event) -> DeliveryOutcome {
        self.send(event).await.into()
    }

    #[instrument(name = "webhook_sink_release", skip(self))]
    async fn release(&mut self) -> Result<(), ContractError> {
        self.released = true;
        debug!(sink = %self.name, "WebhookSink released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(endpoint: String) -> WebhookConfig {
        WebhookConfig {
            endpoint,
            method: "POST".into(),
            headers: BTreeMap::from([("X-Reason".to_string(), "{{ .reason }}".to_string())]),
            layout: Some(json!({ "text": "{{ .involvedObject.name }} {{ .reason }}" })),
        }
    }

    fn event() -> Event {
        let mut event = Event {
            reason: "OOMKilled".into(),
            ..Default::default()
        };
        event.involved_object.name = "web-1".into();
        event
    }

    #[tokio::test]
    async fn test_webhook_posts_layout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("X-Reason", "OOMKilled"))
            .and(body_json(json!({ "text": "web-1 OOMKilled" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut sink = WebhookSink::new("hook", &config(format!("{}/hook", server.uri()))).unwrap();
        assert_eq!(sink.deliver(&event()).await, DeliveryOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_webhook_classifies_failures() {
        let server = MockServer::start().await;
        Mock::given(path("/busy"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(path("/denied"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let mut busy = WebhookSink::new("busy", &config(format!("{}/busy", server.uri()))).unwrap();
        assert!(matches!(
            busy.deliver(&event()).await,
            DeliveryOutcome::Retryable(_)
        ));

        let mut denied =
            WebhookSink::new("denied", &config(format!("{}/denied", server.uri()))).unwrap();
        assert!(matches!(
            denied.deliver(&event()).await,
            DeliveryOutcome::Fatal(_)
        ));
    }

    #[test]
    fn test_construction_rejects_bad_endpoint() {
        let err = WebhookSink::new("hook", &config("localhost:80".into()));
        assert!(err.is_err());
    }

    #[test]
    fn test_construction_rejects_bad_template() {
        let mut cfg = config("http://localhost/hook".into());
        cfg.layout = Some(json!({ "text": "{{ .reason" }));
        let err = WebhookSink::new("hook", &cfg).err().unwrap();
        assert!(err.to_string().contains("layout"));
    }
}
