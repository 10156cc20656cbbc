//! SlackSink - `chat.postMessage` per event
//!
//! Slack answers HTTP 200 for most failures and reports them in the body.

use contracts::{
    ContractError, DeliveryError, DeliveryOutcome, Event, EventSink, SinkKind, SlackConfig,
};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::http;
use crate::template::{Template, event_context};

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct SlackSink {
    name: String,
    client: reqwest::Client,
    url: Url,
    token: String,
    channel: String,
    message: Template,
    fields: Vec<(String, Template)>,
    released: bool,
}

impl SlackSink {
    pub fn new(name: impl Into<String>, config: &SlackConfig) -> Result<Self, ContractError> {
        let name = name.into();
        let url = http::parse_url(&name, &config.url)?;
        let message = Template::parse(&config.message)
            .map_err(|e| ContractError::sink_construction(&name, format!("message: {e}")))?;
        let fields = config
            .fields
            .iter()
            .map(|(title, value)| {
                Template::parse(value)
                    .map(|t| (title.clone(), t))
                    .map_err(|e| {
                        ContractError::sink_construction(&name, format!("field '{title}': {e}"))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            client: http::build_client(&name)?,
            name,
            url,
            token: config.token.clone(),
            channel: config.channel.clone(),
            message,
            fields,
            released: false,
        })
    }

    fn message_body(&self, event: &Event) -> Result<Value, DeliveryError> {
        let context = event_context(event)?;
        let mut body = json!({
            "channel": self.channel,
            "text": self.message.render(&context),
        });
        if !self.fields.is_empty() {
            let fields: Vec<Value> = self
                .fields
                .iter()
                .map(|(title, value)| {
                    json!({ "title": title, "value": value.render(&context), "short": false })
                })
                .collect();
            body["attachments"] = json!([{ "fields": fields }]);
        }
        Ok(body)
    }

    async fn post(&self, event: &Event) -> Result<(), DeliveryError> {
        if self.released {
            return Err(DeliveryError::Released);
        }
        let body = self.message_body(event)?;
        let request = self
            .client
            .post(self.url.clone())
            .bearer_auth(&self.token)
            .json(&body);
        let response = http::send(request).await?;
        check_response(&response)
    }
}

fn check_response(response: &str) -> Result<(), DeliveryError> {
    let parsed: PostMessageResponse = serde_json::from_str(response)
        .map_err(|e| DeliveryError::network(format!("unexpected Slack response: {e}")))?;
    if parsed.ok {
        return Ok(());
    }
    match parsed.error.as_deref() {
        Some("ratelimited") => Err(DeliveryError::throttled("ratelimited")),
        Some(error @ ("invalid_auth" | "not_authed" | "token_revoked" | "account_inactive")) => {
            debug!(error, "Slack rejected credentials");
            Err(DeliveryError::Unauthorized { status: 200 })
        }
        other => Err(DeliveryError::Rejected {
            status: 200,
            body: other.unwrap_or("unknown_error").to_string(),
        }),
    }
}

impl EventSink for SlackSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Slack
    }

    #[instrument(
        name = "slack_sink_deliver",
        skip(self, event),
        fields(sink = %self.name, event_id = %event.id())
    )]
    async fn deliver(&mut self, event: &Event) -> DeliveryOutcome {
        self.post(event).await.into()
    }

    async fn release(&mut self) -> Result<(), ContractError> {
        self.released = true;
        debug!(sink = %self.name, "SlackSink released");
        Ok(())
    }
}
