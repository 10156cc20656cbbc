//! ElasticsearchSink - `_bulk` indexing, one document per event

use chrono::format::{Item, StrftimeItems};
use chrono::Utc;
use contracts::{
    ContractError, DeliveryError, DeliveryOutcome, ElasticsearchConfig, Event, EventSink, SinkKind,
};
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use super::http;
use super::render_payload;
use crate::template::Layout;

#[derive(Debug, Clone)]
enum Auth {
    None,
    Basic { username: String, password: Option<String> },
    ApiKey(String),
}

/// Bulk response, only the parts needed to detect per-item failures
#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// Sink that indexes events into Elasticsearch / OpenSearch
pub struct ElasticsearchSink {
    name: String,
    client: reqwest::Client,
    bulk_url: Url,
    index: String,
    index_format: Option<String>,
    auth: Auth,
    use_event_id: bool,
    layout: Option<Layout>,
    released: bool,
}

impl ElasticsearchSink {
    pub fn new(name: impl Into<String>, config: &ElasticsearchConfig) -> Result<Self, ContractError> {
        let name = name.into();
        let host = config
            .hosts
            .first()
            .ok_or_else(|| ContractError::sink_construction(&name, "no hosts configured"))?;
        let mut base = http::parse_url(&name, host)?;
        // keep a path prefix such as `/es` when joining
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let bulk_url = base.join("_bulk").map_err(|e| {
            ContractError::sink_construction(&name, format!("invalid host '{host}': {e}"))
        })?;

        if let Some(format) = &config.index_format {
            if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
                return Err(ContractError::sink_construction(
                    &name,
                    format!("invalid index_format '{format}'"),
                ));
            }
        }

        let auth = match (&config.api_key, &config.username) {
            (Some(key), _) => Auth::ApiKey(key.clone()),
            (None, Some(username)) => Auth::Basic {
                username: username.clone(),
                password: config.password.clone(),
            },
            (None, None) => Auth::None,
        };

        let layout = config
            .layout
            .as_ref()
            .map(Layout::compile)
            .transpose()
            .map_err(|e| ContractError::sink_construction(&name, format!("layout: {e}")))?;

        Ok(Self {
            client: http::build_client(&name)?,
            name,
            bulk_url,
            index: config.index.clone(),
            index_format: config.index_format.clone(),
            auth,
            use_event_id: config.use_event_id,
            layout,
            released: false,
        })
    }

    /// `<index>` or `<index>-<formatted date>`
    fn index_name(&self) -> String {
        match &self.index_format {
            Some(format) => format!("{}-{}", self.index, Utc::now().format(format)),
            None => self.index.clone(),
        }
    }

    fn bulk_body(&self, event: &Event) -> Result<String, DeliveryError> {
        let (_, document) = render_payload(self.layout.as_ref(), event)?;
        let mut action = json!({ "_index": self.index_name() });
        if self.use_event_id && !event.metadata.uid.is_empty() {
            action["_id"] = json!(event.metadata.uid);
        }
        let mut body = serde_json::to_string(&json!({ "index": action }))?;
        body.push('\n');
        body.push_str(&serde_json::to_string(&document)?);
        body.push('\n');
        Ok(body)
    }

    async fn index(&self, event: &Event) -> Result<(), DeliveryError> {
        if self.released {
            return Err(DeliveryError::Released);
        }
        let body = self.bulk_body(event)?;
        let mut request = self
            .client
            .post(self.bulk_url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body);
        request = match &self.auth {
            Auth::None => request,
            Auth::Basic { username, password } => request.basic_auth(username, password.as_ref()),
            Auth::ApiKey(key) => {
                request.header(reqwest::header::AUTHORIZATION, format!("ApiKey {key}"))
            }
        };

        let response = http::send(request).await?;
        check_bulk_items(&response)
    }
}

/// A 200 bulk response can still carry per-item failures
fn check_bulk_items(response: &str) -> Result<(), DeliveryError> {
    let Ok(parsed) = serde_json::from_str::<BulkResponse>(response) else {
        return Ok(());
    };
    if !parsed.errors {
        return Ok(());
    }
    let failed = parsed
        .items
        .iter()
        .filter_map(|item| item.values().next())
        .find(|result| result.get("error").is_some());
    let Some(result) = failed else {
        return Ok(());
    };

    let status = result
        .get("status")
        .and_then(|s| s.as_u64())
        .unwrap_or(400) as u16;
    let reason = result["error"].to_string();
    http::classify_status(status, reason).map(|_| ())
}

impl EventSink for ElasticsearchSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Elasticsearch
    }

    #[instrument(
        name = "elasticsearch_sink_deliver",
        skip(self, event),
        fields(sink = %self.name, event_id = %event.id())
    )]
    async fn deliver(&mut self, event: &Event) -> DeliveryOutcome {
        self.index(event).await.into()
    }

    async fn release(&mut self) -> Result<(), ContractError> {
        self.released = true;
        debug!(sink = %self.name, "ElasticsearchSink released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn config(host: String) -> ElasticsearchConfig {
        ElasticsearchConfig {
            hosts: vec![host],
            index: "kube-events".into(),
            index_format: None,
            username: Some("elastic".into()),
            password: Some("changeme".into()),
            api_key: None,
            use_event_id: true,
            layout: None,
        }
    }

    fn event() -> Event {
        let mut event = Event {
            reason: "Scheduled".into(),
            ..Default::default()
        };
        event.metadata.uid = "uid-1".into();
        event
    }

    #[tokio::test]
    async fn test_bulk_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .and(header("content-type", "application/x-ndjson"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": false,
                "items": [{ "index": { "status": 201 } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut sink = ElasticsearchSink::new("es", &config(server.uri())).unwrap();
        assert!(sink.deliver(&event()).await.is_delivered());

        let requests: Vec<Request> = server.received_requests().await.unwrap();
        let body = String::from_utf8(requests[0].body.clone()).unwrap();
        let mut lines = body.lines();
        let action: serde_json::Value = serde_json::from_str(lines.next().unwrap()).unwrap();
        assert_eq!(action["index"]["_index"], "kube-events");
        assert_eq!(action["index"]["_id"], "uid-1");
        let doc: serde_json::Value = serde_json::from_str(lines.next().unwrap()).unwrap();
        assert_eq!(doc["reason"], "Scheduled");
        assert!(requests[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn test_item_level_rejection_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(path("/_bulk"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": true,
                "items": [{ "index": { "status": 400, "error": { "type": "mapper_parsing_exception" } } }]
            })))
            .mount(&server)
            .await;

        let mut sink = ElasticsearchSink::new("es", &config(server.uri())).unwrap();
        assert!(matches!(sink.deliver(&event()).await, DeliveryOutcome::Fatal(_)));
    }

    #[tokio::test]
    async fn test_item_level_throttle_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(path("/_bulk"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": true,
                "items": [{ "index": { "status": 429, "error": { "type": "es_rejected_execution_exception" } } }]
            })))
            .mount(&server)
            .await;

        let mut sink = ElasticsearchSink::new("es", &config(server.uri())).unwrap();
        assert!(matches!(sink.deliver(&event()).await, DeliveryOutcome::Retryable(_)));
    }

    #[test]
    fn test_bulk_url_keeps_path_prefix() {
        let sink = ElasticsearchSink::new("es", &config("http://proxy:8080/es".into())).unwrap();
        assert_eq!(sink.bulk_url.as_str(), "http://proxy:8080/es/_bulk");

        let sink = ElasticsearchSink::new("es", &config("http://proxy:8080/es/".into())).unwrap();
        assert_eq!(sink.bulk_url.as_str(), "http://proxy:8080/es/_bulk");

        let sink = ElasticsearchSink::new("es", &config("http://localhost:9200".into())).unwrap();
        assert_eq!(sink.bulk_url.as_str(), "http://localhost:9200/_bulk");
    }

    #[test]
    fn test_dated_index_name() {
        let mut cfg = config("http://localhost:9200".into());
        cfg.index_format = Some("%Y.%m.%d".into());
        let sink = ElasticsearchSink::new("es", &cfg).unwrap();
        let expected = format!("kube-events-{}", Utc::now().format("%Y.%m.%d"));
        assert_eq!(sink.index_name(), expected);
    }

    #[test]
    fn test_invalid_index_format_rejected() {
        let mut cfg = config("http://localhost:9200".into());
        cfg.index_format = Some("%Q".into());
        assert!(ElasticsearchSink::new("es", &cfg).is_err());
    }
}
