//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Sink creation error
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// Two receivers share a name
    #[error("duplicate receiver '{name}'")]
    DuplicateReceiver { name: String },

    /// Route names a receiver that is not configured
    #[error("route {route} references unknown receiver '{name}'")]
    UnknownRouteDestination { route: usize, name: String },

    /// Route selector failed to compile
    #[error("route {route} has invalid {field} selector: {message}")]
    InvalidRoute {
        route: usize,
        field: String,
        message: String,
    },

    /// Contract-level error (destination resolution, config)
    #[error("contract error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    /// Create a sink creation error
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an invalid route error
    pub fn invalid_route(route: usize, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRoute {
            route,
            field: field.into(),
            message: message.into(),
        }
    }
}
