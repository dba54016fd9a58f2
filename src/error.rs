use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::types::SessionId;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Backend failures that are worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransientKind {
    ConnectionReset,
    RateLimited,
}

impl TransientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransientKind::ConnectionReset => "connection_reset",
            TransientKind::RateLimited => "rate_limited",
        }
    }
}

impl fmt::Display for TransientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("unknown agent type: {0}")]
    UnknownType(String),

    #[error("agent type already registered: {0}")]
    DuplicateType(String),

    #[error("unknown council role: {0}")]
    UnknownRole(String),

    #[error("agent '{agent}' does not handle task type '{task_type}'")]
    UnknownTaskType { agent: String, task_type: String },

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("role '{role}' is not a participant of session {session}")]
    NotParticipant { role: String, session: SessionId },

    #[error("pre-execution validation failed: {0}")]
    PreconditionFailed(String),

    #[error("task timed out after {0:?}")]
    Timeout(Duration),

    #[error("transient backend failure ({kind}): {message}")]
    TransientBackend { kind: TransientKind, message: String },

    #[error("backend error: {0}")]
    Backend(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("agent '{agent}' is not permitted to use tool '{tool}'")]
    PermissionDenied { agent: String, tool: String },

    #[error("tool '{tool}' failed: {message}")]
    Tool { tool: String, message: String },

    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// Flat classification of [`OrchestratorError`], used in metrics and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    CapacityExceeded,
    UnknownType,
    DuplicateType,
    UnknownRole,
    UnknownTaskType,
    AgentNotFound,
    SessionNotFound,
    NotParticipant,
    PreconditionFailed,
    Timeout,
    TransientBackend,
    Backend,
    ValidationFailed,
    PermissionDenied,
    Tool,
    InvalidState,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::CapacityExceeded => "capacity_exceeded",
            ErrorKind::UnknownType => "unknown_type",
            ErrorKind::DuplicateType => "duplicate_type",
            ErrorKind::UnknownRole => "unknown_role",
            ErrorKind::UnknownTaskType => "unknown_task_type",
            ErrorKind::AgentNotFound => "agent_not_found",
            ErrorKind::SessionNotFound => "session_not_found",
            ErrorKind::NotParticipant => "not_participant",
            ErrorKind::PreconditionFailed => "precondition_failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::TransientBackend => "transient_backend",
            ErrorKind::Backend => "backend",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::Tool => "tool",
            ErrorKind::InvalidState => "invalid_state",
        }
    }
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::Configuration(_) => ErrorKind::Configuration,
            OrchestratorError::CapacityExceeded(_) => ErrorKind::CapacityExceeded,
            OrchestratorError::UnknownType(_) => ErrorKind::UnknownType,
            OrchestratorError::DuplicateType(_) => ErrorKind::DuplicateType,
            OrchestratorError::UnknownRole(_) => ErrorKind::UnknownRole,
            OrchestratorError::UnknownTaskType { .. } => ErrorKind::UnknownTaskType,
            OrchestratorError::AgentNotFound(_) => ErrorKind::AgentNotFound,
            OrchestratorError::SessionNotFound(_) => ErrorKind::SessionNotFound,
            OrchestratorError::NotParticipant { .. } => ErrorKind::NotParticipant,
            OrchestratorError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            OrchestratorError::Timeout(_) => ErrorKind::Timeout,
            OrchestratorError::TransientBackend { .. } => ErrorKind::TransientBackend,
            OrchestratorError::Backend(_) => ErrorKind::Backend,
            OrchestratorError::ValidationFailed(_) => ErrorKind::ValidationFailed,
            OrchestratorError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            OrchestratorError::Tool { .. } => ErrorKind::Tool,
            OrchestratorError::InvalidState(_) => ErrorKind::InvalidState,
        }
    }

    /// Only timeouts and transient backend failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Timeout(_) | OrchestratorError::TransientBackend { .. }
        )
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        OrchestratorError::TransientBackend {
            kind: TransientKind::RateLimited,
            message: message.into(),
        }
    }

    pub fn connection_reset(message: impl Into<String>) -> Self {
        OrchestratorError::TransientBackend {
            kind: TransientKind::ConnectionReset,
            message: message.into(),
        }
    }
}
