//! Remote agent error types

use reqwest::StatusCode;
use thiserror::Error;

/// Remote agent failure with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AgentError {
    pub kind: AgentErrorKind,
    pub message: String,
}

impl AgentError {
    pub fn new(kind: AgentErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Network, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Auth, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Server, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::InvalidResponse, message)
    }

    pub fn speech(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Speech, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Unknown, message)
    }

    /// Classify a non-success HTTP response
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 | 403 => Self::auth(format!("HTTP {status}: {body}")),
            429 | 500..=599 => Self::server(format!("HTTP {status}: {body}")),
            _ => Self::unknown(format!("HTTP {status}: {body}")),
        }
    }

    /// Classify a transport-level reqwest failure
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network(format!("Request timeout: {err}"))
        } else if err.is_connect() {
            Self::network(format!("Connection failed: {err}"))
        } else {
            Self::unknown(format!("Request failed: {err}"))
        }
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentErrorKind {
    /// Timeouts, refused connections
    Network,
    /// Bad or expired credentials
    Auth,
    /// 5xx or throttling from the agent service
    Server,
    /// Reply could not be parsed, or no reply arrived
    InvalidResponse,
    /// Speech-to-text failed
    Speech,
    Unknown,
}

impl AgentErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Server | Self::Speech)
    }
}
