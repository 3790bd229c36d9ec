//! Provider error types

use thiserror::Error;

/// Errors surfaced by resource handlers and the ARM client
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error(
        "A resource with the ID {id:?} already exists - to be managed this {resource_type} needs to be imported"
    )]
    AlreadyExists { resource_type: String, id: String },

    #[error("API error: {status} {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Long-running operation ended in {status}: {code}: {message}")]
    OperationFailed {
        status: String,
        code: String,
        message: String,
    },

    #[error("Invalid resource ID {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    #[error("Invalid configuration:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),

    #[error("Changing {} requires the resource to be replaced", .0.join(", "))]
    RequiresReplacement(Vec<String>),

    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    #[error("Cannot import non-existent remote object {id:?} ({resource_type})")]
    ImportNonExistent { resource_type: String, id: String },

    #[error("Timed out after {minutes}m during {operation} of {resource_type}")]
    Timeout {
        operation: String,
        resource_type: String,
        minutes: u64,
    },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ProviderError>,
    },
}

pub type Result<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    /// Whether this error (or the error it wraps) is an HTTP 404 / missing resource
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Api { status, .. } => *status == 404,
            Self::Context { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Wrap this error with a description of what was being attempted
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn already_exists(resource_type: &str, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            resource_type: resource_type.to_string(),
            id: id.into(),
        }
    }

    pub fn invalid_id(id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidId {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Attach context to the error side of a `Result`
pub trait ResultExt<T> {
    fn context_with<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context_with<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_survives_context() {
        let err = ProviderError::Api {
            status: 404,
            code: "ResourceNotFound".to_string(),
            message: "gone".to_string(),
        }
        .context("retrieving SQL Firewall Rule \"fw\"");

        assert!(err.is_not_found());
        assert!(err.to_string().starts_with("retrieving SQL Firewall Rule"));
    }

    #[test]
    fn test_conflict_is_not_not_found() {
        let err = ProviderError::Api {
            status: 409,
            code: "Conflict".to_string(),
            message: "busy".to_string(),
        };
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_validation_lists_every_problem() {
        let err = ProviderError::Validation(vec!["a".to_string(), "b".to_string()]);
        let msg = err.to_string();
        assert!(msg.contains("- a"));
        assert!(msg.contains("- b"));
    }
}
