//! Layered error definitions
//!
//! Categorized by source: config / destination / delivery / source

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Destination Errors =====
    /// Receiver has no destination payload populated
    #[error("unknown destination for receiver '{receiver}': no destination kind configured")]
    UnknownDestination { receiver: String },

    /// Receiver has more than one destination payload populated
    #[error("receiver '{receiver}' configures multiple destination kinds: {kinds:?}")]
    ConflictingDestinations {
        receiver: String,
        kinds: Vec<&'static str>,
    },

    // ===== Sink Errors =====
    /// Sink construction error
    #[error("sink '{sink_name}' construction error: {message}")]
    SinkConstruction { sink_name: String, message: String },

    /// Sink release error
    #[error("sink '{sink_name}' release error: {message}")]
    SinkRelease { sink_name: String, message: String },

    // ===== Source Errors =====
    /// Event source error
    #[error("event source '{source_name}' error: {message}")]
    Source { source_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create sink construction error
    pub fn sink_construction(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkConstruction {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create sink release error
    pub fn sink_release(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkRelease {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create event source error
    pub fn source(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

/// Classified failure of a single delivery attempt
///
/// Each sink maps its transport failures onto these variants; the worker
/// only looks at [`DeliveryError::is_retryable`].
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Attempt exceeded its deadline
    #[error("delivery timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Connection-level failure
    #[error("network error: {message}")]
    Network { message: String },

    /// Remote side failed (5xx)
    #[error("server error: HTTP {status}: {body}")]
    Server { status: u16, body: String },

    /// Remote side asked us to slow down
    #[error("throttled: {message}")]
    Throttled { message: String },

    /// Credentials rejected
    #[error("unauthorized: HTTP {status}")]
    Unauthorized { status: u16 },

    /// Remote side rejected the request (4xx)
    #[error("rejected: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Payload could not be produced
    #[error("encode error: {message}")]
    Encode { message: String },

    /// Local IO failure
    #[error("io error: {message}")]
    Io { message: String },

    /// Sink already released
    #[error("sink released")]
    Released,
}

impl DeliveryError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn throttled(message: impl Into<String>) -> Self {
        Self::Throttled {
            message: message.into(),
        }
    }

    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Whether the worker should retry the attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::Network { .. }
                | Self::Server { .. }
                | Self::Throttled { .. }
                | Self::Io { .. }
        )
    }
}

impl From<std::io::Error> for DeliveryError {
    fn from(e: std::io::Error) -> Self {
        Self::Io {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(e: serde_json::Error) -> Self {
        Self::encode(e.to_string())
    }
}
