//! Error taxonomy shared by the inventory providers, the reconciliation
//! engine and the action executor.
//!
//! Variants carry plain strings so an error can be recorded on an
//! [`Action`](crate::plan::Action) and compared in tests.

use thiserror::Error;

/// Errors that can occur while reconciling mirrors between two platforms.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MirrorError {
    /// Network, authentication or rate-limit failure talking to a platform.
    #[error("{platform} request failed: {message}")]
    Transport {
        platform: &'static str,
        message: String,
    },

    /// A platform returned state that makes the plan untrustworthy.
    #[error("Inconsistent data from {platform}: {message}")]
    DataIntegrity {
        platform: &'static str,
        message: String,
    },

    /// A repository or mirror already exists on the target platform.
    #[error("{platform} already has {resource}")]
    CreationConflict {
        platform: &'static str,
        resource: String,
    },

    /// Missing or invalid credentials, or a malformed repository argument.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The requested repository does not exist.
    #[error("{platform} repository not found: {resource}")]
    NotFound {
        platform: &'static str,
        resource: String,
    },

    /// The platform has no equivalent of the requested operation.
    #[error("{platform} does not support {operation}")]
    Unsupported {
        platform: &'static str,
        operation: &'static str,
    },
}

impl MirrorError {
    pub fn transport(platform: &'static str, message: impl Into<String>) -> Self {
        Self::Transport {
            platform,
            message: message.into(),
        }
    }

    pub fn integrity(platform: &'static str, message: impl Into<String>) -> Self {
        Self::DataIntegrity {
            platform,
            message: message.into(),
        }
    }

    pub fn conflict(platform: &'static str, resource: impl Into<String>) -> Self {
        Self::CreationConflict {
            platform,
            resource: resource.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn not_found(platform: &'static str, resource: impl Into<String>) -> Self {
        Self::NotFound {
            platform,
            resource: resource.into(),
        }
    }

    /// Whether this error must abort the whole run when it happens outside
    /// of a single action's apply step.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::CreationConflict { .. })
    }

    /// Whether this error reports a create call racing an existing resource.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::CreationConflict { .. })
    }
}

/// Extract a short error message suitable for tables and summaries.
pub fn short_error_message(error: &MirrorError) -> String {
    let message = error.to_string();
    message.lines().next().unwrap_or_default().to_string()
}
