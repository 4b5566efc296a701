//! Error types for the Parley engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a message is rejected before anything is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    /// Nothing left after trimming whitespace
    #[error("message is empty")]
    Empty,

    /// Longer than the configured hard cap (in characters)
    #[error("message is too long: {length} characters (max {max})")]
    TooLong { length: usize, max: usize },

    /// Matched the contact-information policy
    #[error("message contains contact information ({pattern})")]
    ContactInfo { pattern: String },
}

/// A shared error type for the entire Parley engine.
///
/// Each variant maps to one class of failure with its own recovery policy:
/// validation and persistence errors reach the caller, gateway errors are
/// recovered inside the message pipeline, and the session-level variants are
/// resolved by the window manager.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ParleyError {
    /// Message rejected before sending. Reported inline, never retried.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Translation or enrichment failed. Recovered locally with fallback text.
    #[error("Translation gateway error: {0}")]
    TransientGateway(String),

    /// Send failed to commit. The original input is handed back for a retry.
    #[error("Persistence error: {message}")]
    Persistence {
        message: String,
        restored_input: Option<String>,
    },

    /// Showing another session would exceed the visible limit
    #[error("Capacity exceeded: {visible} of {max_visible} windows open")]
    CapacityExceeded { visible: usize, max_visible: usize },

    /// A second session for a partner that already has one open
    #[error("Duplicate session {session_id} for partner '{partner_id}' (existing: {existing_session_id})")]
    DuplicatePartnerSession {
        partner_id: String,
        session_id: String,
        existing_session_id: String,
    },

    /// Partner went offline or the session ended remotely
    #[error("Partner unavailable for session {session_id}")]
    PartnerUnavailable { session_id: String },

    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound { entity_type: String, id: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a NotFound error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Creates a TransientGateway error
    pub fn gateway(message: impl Into<String>) -> Self {
        Self::TransientGateway(message.into())
    }

    /// Creates a Persistence error without a restorable input
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
            restored_input: None,
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Attaches the user's original input to a persistence error.
    ///
    /// Other variants are returned unchanged.
    pub fn with_restored_input(self, input: impl Into<String>) -> Self {
        match self {
            Self::Persistence { message, .. } => Self::Persistence {
                message,
                restored_input: Some(input.into()),
            },
            other => other,
        }
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a gateway error
    pub fn is_transient_gateway(&self) -> bool {
        matches!(self, Self::TransientGateway(_))
    }

    /// Check if this is a persistence error
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }

    /// Check if this is a duplicate partner error
    pub fn is_duplicate_partner(&self) -> bool {
        matches!(self, Self::DuplicatePartnerSession { .. })
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the user may retry the action that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }

    /// The input to put back into the text box, if any.
    pub fn restored_input(&self) -> Option<&str> {
        match self {
            Self::Persistence { restored_input, .. } => restored_input.as_deref(),
            _ => None,
        }
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for ParleyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for ParleyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for ParleyError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for ParleyError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, ParleyError>`.
pub type Result<T> = std::result::Result<T, ParleyError>;
