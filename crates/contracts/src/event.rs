//! Event - Event Source output
//!
//! Platform state-change record. The JSON shape follows the Kubernetes
//! `core/v1` Event object so watch output can be fed in unchanged.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exported event
///
/// Immutable once dispatched; the dispatcher shares it between
/// destinations behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Identity and metadata mapping
    #[serde(default)]
    pub metadata: EventMetadata,

    /// Object the event is about
    #[serde(default)]
    pub involved_object: ObjectReference,

    /// Short machine-readable reason (e.g. `OOMKilled`)
    #[serde(default)]
    pub reason: String,

    /// Human-readable description
    #[serde(default)]
    pub message: String,

    /// Severity (`Normal` / `Warning`)
    #[serde(default, rename = "type")]
    pub severity: Severity,

    /// First time the event was observed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_timestamp: Option<DateTime<Utc>>,

    /// Most recent time the event was observed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<DateTime<Utc>>,

    /// Number of occurrences
    #[serde(default = "default_count")]
    pub count: u32,

    /// Reporting component
    #[serde(default)]
    pub source: EventOrigin,
}

fn default_count() -> u32 {
    1
}

impl Default for Event {
    fn default() -> Self {
        Self {
            metadata: EventMetadata::default(),
            involved_object: ObjectReference::default(),
            reason: String::new(),
            message: String::new(),
            severity: Severity::Normal,
            first_timestamp: None,
            last_timestamp: None,
            count: default_count(),
            source: EventOrigin::default(),
        }
    }
}

/// Event identity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub uid: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Reference to the involved object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    #[serde(default)]
    pub kind: String,

    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub uid: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,

    /// Labels of the involved object (filled by enriching sources)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Reporting component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventOrigin {
    #[serde(default)]
    pub component: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,
}

/// Event severity
///
/// Unknown values are preserved verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    #[default]
    Normal,
    Warning,
    Other(String),
}

impl Severity {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Normal => "Normal",
            Self::Warning => "Warning",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for Severity {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Normal" | "" => Self::Normal,
            "Warning" => Self::Warning,
            _ => Self::Other(value),
        }
    }
}

impl From<Severity> for String {
    fn from(value: Severity) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Event {
    /// Stable identifier used for logging, partition keys and document ids
    ///
    /// Falls back to `namespace/name` when the uid is empty.
    pub fn id(&self) -> String {
        if self.metadata.uid.is_empty() {
            format!("{}/{}", self.metadata.namespace, self.metadata.name)
        } else {
            self.metadata.uid.clone()
        }
    }

    /// Namespace used for routing (the involved object's, then the event's)
    pub fn namespace(&self) -> &str {
        if self.involved_object.namespace.is_empty() {
            &self.metadata.namespace
        } else {
            &self.involved_object.namespace
        }
    }

    /// Best-known timestamp for the event
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_timestamp.or(self.first_timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KUBE_EVENT: &str = r#"{
        "metadata": { "name": "web-1.17a", "namespace": "prod", "uid": "abc-123" },
        "involvedObject": {
            "kind": "Pod", "namespace": "prod", "name": "web-1",
            "uid": "pod-1", "apiVersion": "v1"
        },
        "reason": "OOMKilled",
        "message": "Container web exceeded its memory limit",
        "type": "Warning",
        "firstTimestamp": "2024-05-01T10:00:00Z",
        "lastTimestamp": "2024-05-01T10:05:00Z",
        "count": 3,
        "source": { "component": "kubelet", "host": "node-a" }
    }"#;

    #[test]
    fn test_parse_kube_event() {
        let event: Event = serde_json::from_str(KUBE_EVENT).unwrap();
        assert_eq!(event.reason, "OOMKilled");
        assert_eq!(event.severity, Severity::Warning);
        assert_eq!(event.count, 3);
        assert_eq!(event.involved_object.kind, "Pod");
        assert_eq!(event.source.component, "kubelet");
        assert_eq!(event.id(), "abc-123");
        assert_eq!(
            event.timestamp().unwrap().to_rfc3339(),
            "2024-05-01T10:05:00+00:00"
        );
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let event: Event = serde_json::from_str(r#"{"reason": "Started"}"#).unwrap();
        assert_eq!(event.count, 1);
        assert_eq!(event.severity, Severity::Normal);
        assert!(event.first_timestamp.is_none());
    }

    #[test]
    fn test_unknown_severity_preserved() {
        let event: Event = serde_json::from_str(r#"{"type": "Critical"}"#).unwrap();
        assert_eq!(event.severity, Severity::Other("Critical".into()));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Critical");
    }

    #[test]
    fn test_namespace_prefers_involved_object() {
        let mut event: Event = serde_json::from_str(r#"{"metadata": {"namespace": "ev"}}"#).unwrap();
        assert_eq!(event.namespace(), "ev");
        event.involved_object.namespace = "obj".into();
        assert_eq!(event.namespace(), "obj");
    }

    #[test]
    fn test_id_falls_back_to_name() {
        let event: Event =
            serde_json::from_str(r#"{"metadata": {"namespace": "ns", "name": "e1"}}"#).unwrap();
        assert_eq!(event.id(), "ns/e1");
    }
}
