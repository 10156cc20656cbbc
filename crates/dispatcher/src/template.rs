//! Field templates: `{{ .involvedObject.name }}`
//!
//! Paths resolve against the event's JSON form. Lookup is case-insensitive on
//! the first letter of each segment, so `{{ .InvolvedObject.Name }}` works too.
//! Missing fields render as an empty string.

use contracts::Event;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unclosed '{{{{' at byte {0}")]
    Unclosed(usize),

    #[error("unsupported template expression '{0}', expected '.path.to.field'")]
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Literal(String),
    Field(Vec<String>),
}

/// Parsed template string
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    parts: Vec<Part>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut parts = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                parts.push(Part::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or(TemplateError::Unclosed(offset + start))?;
            parts.push(Part::Field(parse_path(after[..end].trim())?));

            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            parts.push(Part::Literal(rest.to_string()));
        }
        Ok(Self { parts })
    }

    pub fn render(&self, context: &Value) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Field(path) => {
                    if let Some(value) = lookup(context, path) {
                        push_value(&mut out, value);
                    }
                }
            }
        }
        out
    }
}

fn parse_path(expr: &str) -> Result<Vec<String>, TemplateError> {
    let Some(path) = expr.strip_prefix('.') else {
        return Err(TemplateError::Unsupported(expr.to_string()));
    };
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
    let valid = segments.iter().all(|s| {
        !s.is_empty()
            && s.chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '/'))
    });
    if !valid {
        return Err(TemplateError::Unsupported(expr.to_string()));
    }
    Ok(segments)
}

fn lookup<'a>(context: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(context, |value, segment| match value {
        Value::Object(map) => field(map, segment),
        _ => None,
    })
}

fn field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    if let Some(value) = map.get(key) {
        return Some(value);
    }
    let mut chars = key.chars();
    let first = chars.next()?;
    let tail = chars.as_str();
    let lower = format!("{}{tail}", first.to_lowercase());
    let upper = format!("{}{tail}", first.to_uppercase());
    map.get(&lower).or_else(|| map.get(&upper))
}

fn push_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push_str(s),
        Value::Bool(b) => out.push_str(&b.to_string()),
        Value::Number(n) => out.push_str(&n.to_string()),
        other => out.push_str(&other.to_string()),
    }
}

/// JSON layout whose string leaves are templates
#[derive(Debug, Clone, PartialEq)]
pub enum Layout {
    Template(Template),
    Array(Vec<Layout>),
    Object(Vec<(String, Layout)>),
    Value(Value),
}

impl Layout {
    pub fn compile(value: &Value) -> Result<Self, TemplateError> {
        Ok(match value {
            Value::String(s) => Self::Template(Template::parse(s)?),
            Value::Array(items) => {
                Self::Array(items.iter().map(Self::compile).collect::<Result<_, _>>()?)
            }
            Value::Object(map) => Self::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), Self::compile(v)?)))
                    .collect::<Result<_, TemplateError>>()?,
            ),
            other => Self::Value(other.clone()),
        })
    }

    pub fn render(&self, context: &Value) -> Value {
        match self {
            Self::Template(t) => Value::String(t.render(context)),
            Self::Array(items) => Value::Array(items.iter().map(|l| l.render(context)).collect()),
            Self::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, l)| (k.clone(), l.render(context)))
                    .collect(),
            ),
            Self::Value(v) => v.clone(),
        }
    }
}

/// JSON form of an event used as template context
pub fn event_context(event: &Event) -> Result<Value, serde_json::Error> {
    serde_json::to_value(event)
}
