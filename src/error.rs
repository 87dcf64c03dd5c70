//! Error taxonomy for the library.
//!
//! `AuthExpired` and `ConnectionTimeout` are produced by the HTTP layer and
//! consumed by its retry policy; callers only ever see them collapsed into
//! [`Error::Remote`].

use std::time::Duration;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("AI Studio request failed{}: {message}", status_suffix(.status))]
    Remote {
        status: Option<u16>,
        message: String,
    },

    #[error("AI Studio token expired")]
    AuthExpired,

    #[error("AI Studio did not respond in time: {0}")]
    ConnectionTimeout(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("agent not found for project [{project}] and code [{agent}]")]
    AgentNotFound { project: String, agent: String },

    #[error("input not defined in agent: {0}")]
    UnknownInput(String),

    #[error("file input \"{0}\" must be a file ID (string)")]
    InvalidInputType(String),

    #[error("model not found for code: {0}")]
    ModelNotFound(String),

    #[error("file upload failed for [{file_id}]: {reason}")]
    Upload { file_id: String, reason: String },

    #[error("waiting for task [{task_id}] to be ready took more than [{}] ms", .timeout.as_millis())]
    Timeout { task_id: String, timeout: Duration },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Remote {
            status,
            message: message.into(),
        }
    }

    /// Collapse retry-only variants into `Remote` once no retry is left.
    pub(crate) fn surfaced(self) -> Self {
        match self {
            Self::AuthExpired => Self::remote(Some(401), "unauthorized"),
            Self::ConnectionTimeout(message) => Self::remote(None, message),
            other => other,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}
