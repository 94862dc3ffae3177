//! Error types for the update engine
//!
//! Every node of the resource tree fails with an [`UpdateError`]. Composite
//! updaters inspect the error only to decide between the blocker and
//! non-blocker branch; callers across the RPC boundary receive the
//! [`ErrorCategory`] so configuration mistakes can be told apart from runtime
//! failures.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type UpdateResult<T> = std::result::Result<T, UpdateError>;

/// Coarse split used by callers that only care whether retrying can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Environment, server, application, resource or agent does not exist.
    NotFound,
    /// Something existed but the operation on it failed.
    OperationFailed,
}

/// Fine-grained category, carried on the wire as `error_kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    NotFound,
    Configuration,
    Controller,
    Transport,
    CacheIo,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Controller => "controller",
            ErrorCategory::Transport => "transport",
            ErrorCategory::CacheIo => "cache_io",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum UpdateError {
    /// A named element of the model could not be resolved
    #[error("{what} '{name}' not found")]
    NotFound { what: &'static str, name: String },

    /// Invalid or incomplete configuration (unknown agent, missing field...)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The target runtime refused or failed an operation
    #[error("controller error on '{resource}': {reason}")]
    Controller { resource: String, reason: String },

    /// A delegated call to another agent failed
    #[error("delegation to agent '{agent}' failed: {reason}")]
    Transport { agent: String, reason: String },

    /// Copy, compare or delete in the agent cache failed
    #[error("cache I/O error on '{path}': {reason}")]
    CacheIo { path: String, reason: String },

    /// A blocker child failed and aborted its parent
    #[error("{node} update aborted: {source}")]
    Blocked {
        node: String,
        #[source]
        source: Box<UpdateError>,
    },

    /// Error reported by a remote agent, category preserved
    #[error("{message}")]
    Remote {
        category: ErrorCategory,
        message: String,
    },
}

impl UpdateError {
    pub fn not_found(what: &'static str, name: impl Into<String>) -> Self {
        UpdateError::NotFound {
            what,
            name: name.into(),
        }
    }

    pub fn controller(resource: impl Into<String>, reason: impl fmt::Display) -> Self {
        UpdateError::Controller {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }

    pub fn cache_io(path: impl AsRef<std::path::Path>, reason: impl fmt::Display) -> Self {
        UpdateError::CacheIo {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn transport(agent: impl Into<String>, reason: impl fmt::Display) -> Self {
        UpdateError::Transport {
            agent: agent.into(),
            reason: reason.to_string(),
        }
    }

    pub fn blocked(node: impl Into<String>, source: UpdateError) -> Self {
        UpdateError::Blocked {
            node: node.into(),
            source: Box::new(source),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            UpdateError::NotFound { .. } => ErrorCategory::NotFound,
            UpdateError::Configuration(_) => ErrorCategory::Configuration,
            UpdateError::Controller { .. } => ErrorCategory::Controller,
            UpdateError::Transport { .. } => ErrorCategory::Transport,
            UpdateError::CacheIo { .. } => ErrorCategory::CacheIo,
            UpdateError::Blocked { source, .. } => source.category(),
            UpdateError::Remote { category, .. } => *category,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.category() {
            ErrorCategory::NotFound => ErrorKind::NotFound,
            _ => ErrorKind::OperationFailed,
        }
    }
}

impl From<sqlx::Error> for UpdateError {
    fn from(err: sqlx::Error) -> Self {
        UpdateError::Controller {
            resource: "database".to_string(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_error_keeps_child_category() {
        let child = UpdateError::not_found("archive", "app.war");
        let err = UpdateError::blocked("application 'shop'", child);

        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("archive 'app.war' not found"));
    }

    #[test]
    fn controller_error_is_operation_failure() {
        let err = UpdateError::controller("pool P1", "connection refused");
        assert_eq!(err.kind(), ErrorKind::OperationFailed);
        assert_eq!(err.category().to_string(), "controller");
    }
}
