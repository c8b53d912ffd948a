//! Error taxonomy for tools and planning.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Faults a tool or one of its collaborators can hit.
///
/// Every variant is converted into an `Error` tool result at the tool
/// boundary; none of them abort an investigation.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// Missing credential or quota key.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Timeout, connection failure, 429 or 5xx. Retried with backoff.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Upstream payload could not be parsed into the expected shape.
    #[error("malformed response: {message}")]
    MalformedResponse { message: String, raw: String },

    /// Non-retryable upstream rejection (e.g. 403).
    #[error("upstream rejected request: {0}")]
    Upstream(String),

    /// The tool's inputs are absent or out of its scope.
    #[error("{0}")]
    Unavailable(String),

    /// A tool exceeded its time budget or panicked.
    #[error("tool fault: {0}")]
    Fault(String),
}

/// Serializable discriminant of [`ToolError`], carried on tool results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    TransientNetwork,
    MalformedResponse,
    Upstream,
    Unavailable,
    Fault,
}

impl ToolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::Configuration(_) => ErrorKind::Configuration,
            ToolError::TransientNetwork(_) => ErrorKind::TransientNetwork,
            ToolError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            ToolError::Upstream(_) => ErrorKind::Upstream,
            ToolError::Unavailable(_) => ErrorKind::Unavailable,
            ToolError::Fault(_) => ErrorKind::Fault,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ToolError::TransientNetwork(_))
    }

    pub fn raw_payload(&self) -> Option<&str> {
        match self {
            ToolError::MalformedResponse { raw, .. } => Some(raw),
            _ => None,
        }
    }

    pub fn malformed(message: impl Into<String>, raw: impl Into<String>) -> Self {
        ToolError::MalformedResponse {
            message: message.into(),
            raw: raw.into(),
        }
    }

    /// Classify a reqwest transport error.
    pub fn from_reqwest(service: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ToolError::TransientNetwork(format!("{} request timed out", service))
        } else if err.is_connect() {
            ToolError::TransientNetwork(format!("cannot connect to {}", service))
        } else if err.is_decode() {
            ToolError::malformed(format!("{} returned an undecodable body", service), err.to_string())
        } else {
            ToolError::TransientNetwork(format!("{} request failed: {}", service, err))
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(service: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!("{} returned HTTP {}: {}", service, status.as_u16(), truncate(body, 200));
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            ToolError::TransientNetwork(message)
        } else if status == reqwest::StatusCode::UNAUTHORIZED {
            ToolError::Configuration(message)
        } else {
            ToolError::Upstream(message)
        }
    }
}

/// The planner could not produce a usable plan from its signals.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningError {
    #[error("plan advice named no registered tools")]
    NoValidTools,

    #[error("dependency cycle involving tool '{0}'")]
    DependencyCycle(String),

    #[error("plan advisor failed: {0}")]
    Advisor(String),
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
