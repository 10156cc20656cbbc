//! OpsgenieSink - alert creation per event

use contracts::{
    ContractError, DeliveryError, DeliveryOutcome, Event, EventSink, OpsgenieConfig, SinkKind,
};
use reqwest::Url;
use reqwest::header::AUTHORIZATION;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use super::http;
use crate::template::{Template, TemplateError, event_context};

/// Opsgenie rejects longer messages
const MAX_MESSAGE_CHARS: usize = 130;

const PRIORITIES: [&str; 5] = ["P1", "P2", "P3", "P4", "P5"];

pub struct OpsgenieSink {
    name: String,
    client: reqwest::Client,
    alerts_url: Url,
    api_key: String,
    priority: Option<String>,
    message: Template,
    alias: Option<Template>,
    description: Option<Template>,
    tags: Vec<Template>,
    released: bool,
}

impl OpsgenieSink {
    pub fn new(name: impl Into<String>, config: &OpsgenieConfig) -> Result<Self, ContractError> {
        let name = name.into();
        let base = http::parse_url(&name, &config.url)?;
        let alerts_url = base.join("/v2/alerts").map_err(|e| {
            ContractError::sink_construction(&name, format!("invalid url '{}': {e}", config.url))
        })?;

        if let Some(priority) = &config.priority {
            if !PRIORITIES.contains(&priority.as_str()) {
                return Err(ContractError::sink_construction(
                    &name,
                    format!("priority '{priority}' must be one of P1..P5"),
                ));
            }
        }

        let template_err =
            |field: &str, e: TemplateError| ContractError::sink_construction(&name, format!("{field}: {e}"));
        let message = Template::parse(&config.message).map_err(|e| template_err("message", e))?;
        let alias = config
            .alias
            .as_deref()
            .map(Template::parse)
            .transpose()
            .map_err(|e| template_err("alias", e))?;
        let description = config
            .description
            .as_deref()
            .map(Template::parse)
            .transpose()
            .map_err(|e| template_err("description", e))?;
        let tags = config
            .tags
            .iter()
            .map(|t| Template::parse(t))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| template_err("tags", e))?;

        Ok(Self {
            client: http::build_client(&name)?,
            name,
            alerts_url,
            api_key: config.api_key.clone(),
            priority: config.priority.clone(),
            message,
            alias,
            description,
            tags,
            released: false,
        })
    }

    fn alert_body(&self, event: &Event) -> Result<Value, DeliveryError> {
        let context = event_context(event)?;
        let message: String = self
            .message
            .render(&context)
            .chars()
            .take(MAX_MESSAGE_CHARS)
            .collect();

        let mut body = Map::new();
        body.insert("message".into(), json!(message));
        if let Some(alias) = &self.alias {
            body.insert("alias".into(), json!(alias.render(&context)));
        }
        if let Some(description) = &self.description {
            body.insert("description".into(), json!(description.render(&context)));
        }
        if let Some(priority) = &self.priority {
            body.insert("priority".into(), json!(priority));
        }
        if !self.tags.is_empty() {
            let tags: Vec<String> = self
                .tags
                .iter()
                .map(|t| t.render(&context))
                .filter(|t| !t.is_empty())
                .collect();
            body.insert("tags".into(), json!(tags));
        }
        Ok(Value::Object(body))
    }

    async fn create_alert(&self, event: &Event) -> Result<(), DeliveryError> {
        if self.released {
            return Err(DeliveryError::Released);
        }
        let body = self.alert_body(event)?;
        let request = self
            .client
            .post(self.alerts_url.clone())
            .header(AUTHORIZATION, format!("GenieKey {}", self.api_key))
            .json(&body);
        http::send(request).await.map(|_| ())
    }
}

impl EventSink for OpsgenieSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Opsgenie
    }

    #[instrument(
        name = "opsgenie_sink_deliver",
        skip(self, event),
        fields(sink = %self.name, event_id = %event.id())
    )]
    async fn deliver(&mut self, event: &Event) -> DeliveryOutcome {
        self.create_alert(event).await.into()
    }

    async fn release(&mut self) -> Result<(), ContractError> {
        self.released = true;
        debug!(sink = %self.name, "OpsgenieSink released");
        Ok(())
    }
}
