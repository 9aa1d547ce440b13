//! Coordination error types
//!
//! Every fallible stick/hub operation returns [`CoordinationResult`]. A denied
//! broadcast is *not* an error: it is a normal [`crate::gate::Decision`].
//! Tool handlers convert errors into agent-friendly JSON via
//! [`CoordinationError::to_structured_json`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for coordination operations
pub type CoordinationResult<T> = Result<T, CoordinationError>;

/// Structured error response for MCP tools.
///
/// ```json
/// {
///   "code": "NOT_HOLDER",
///   "message": "Agent 'a2' does not hold the speaking stick",
///   "recovery_action": "Call get_speaking_stick_status to see who holds the stick",
///   "context": { "agent_id": "a2", "current_holder": "a1" }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Machine-readable error code
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Actionable recovery instruction for the agent
    pub recovery_action: String,

    /// Relevant context for debugging and recovery
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Whether this error is retryable
    #[serde(default)]
    pub retryable: bool,
}

impl StructuredError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        recovery_action: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            recovery_action: recovery_action.into(),
            context: HashMap::new(),
            retryable: false,
        }
    }

    /// Add context key-value pair
    pub fn with_context(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for StructuredError {}

/// Errors raised by the turn coordinator, violation tracker and hub
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinationError {
    /// Malformed input: empty agent id, bad topic pattern, unknown level
    #[error("Validation error: {message}")]
    ValidationError { message: String },

    /// Mode string is not one of the defined modes
    #[error("Invalid mode '{mode}': expected 'chaos' or 'speaking-stick'")]
    InvalidMode { mode: String },

    /// Release attempted by an agent that does not hold the stick
    #[error("Agent '{agent_id}' does not hold the speaking stick")]
    NotHolder {
        agent_id: String,
        current_holder: Option<String>,
    },

    /// A guard was poisoned by a panicking thread
    #[error("Lock poisoned: {resource}")]
    LockPoisoned { resource: String },
}

impl CoordinationError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn invalid_mode(mode: impl Into<String>) -> Self {
        Self::InvalidMode { mode: mode.into() }
    }

    pub fn not_holder(agent_id: impl Into<String>, current_holder: Option<String>) -> Self {
        Self::NotHolder {
            agent_id: agent_id.into(),
            current_holder,
        }
    }

    pub fn lock_poisoned(resource: impl Into<String>) -> Self {
        Self::LockPoisoned {
            resource: resource.into(),
        }
    }

    /// Only lock poisoning may clear up on retry (a fresh server instance)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockPoisoned { .. })
    }

    /// Convert to structured error for MCP tool responses
    pub fn to_structured(&self) -> StructuredError {
        let (code, recovery) = match self {
            Self::ValidationError { .. } => (
                "VALIDATION_ERROR",
                "Check the request parameters (agent_id must be non-empty, patterns look like \
                 'agent/registered' or 'agent/*') and try again."
                    .to_string(),
            ),
            Self::InvalidMode { .. } => (
                "INVALID_MODE",
                "Use mode 'chaos' or 'speaking-stick'.".to_string(),
            ),
            Self::NotHolder { current_holder, .. } => (
                "NOT_HOLDER",
                match current_holder {
                    Some(holder) => format!(
                        "Only '{}' can release the stick. Call request_speaking_stick to join the queue.",
                        holder
                    ),
                    None => "No one holds the stick. Call request_speaking_stick to take it."
                        .to_string(),
                },
            ),
            Self::LockPoisoned { .. } => (
                "LOCK_POISONED",
                "Coordinator state is unavailable. Restart the server.".to_string(),
            ),
        };

        let mut structured = StructuredError::new(code, self.to_string(), recovery);
        structured.retryable = self.is_retryable();

        match self {
            Self::NotHolder {
                agent_id,
                current_holder,
            } => structured
                .with_context("agent_id", agent_id.clone())
                .with_context(
                    "current_holder",
                    current_holder
                        .clone()
                        .map(serde_json::Value::String)
                        .unwrap_or(serde_json::Value::Null),
                ),
            Self::InvalidMode { mode } => structured.with_context("mode", mode.clone()),
            _ => structured,
        }
    }

    /// Structured error serialized as JSON (falls back to the plain message)
    pub fn to_structured_json(&self) -> String {
        serde_json::to_string_pretty(&self.to_structured()).unwrap_or_else(|_| self.to_string())
    }
}
