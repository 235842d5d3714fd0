use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Where a user-visible error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// Service unreachable or health probe negative.
    Connectivity,
    /// A local precondition failed (missing files, beat out of range).
    Validation,
    /// Service reachable but rejected the request.
    ServerRejection,
}

/// The single dismissible message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowError {
    pub message: String,
    pub scope: ErrorScope,
}

impl WorkflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            scope: ErrorScope::Validation,
        }
    }

    pub fn connectivity(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            scope: ErrorScope::Connectivity,
        }
    }

}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<&ServiceError> for WorkflowError {
    fn from(e: &ServiceError) -> Self {
        Self {
            message: e.user_message(),
            scope: e.scope(),
        }
    }
}

/// Failure talking to the analysis backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error("backend unreachable: {0}")]
    Connectivity(String),

    #[error("backend rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed backend response: {0}")]
    Decode(String),
}

impl ServiceError {
    pub fn scope(&self) -> ErrorScope {
        match self {
            ServiceError::Connectivity(_) => ErrorScope::Connectivity,
            ServiceError::Rejected { .. } | ServiceError::Decode(_) => ErrorScope::ServerRejection,
        }
    }

    /// Message for display: the server's own `error` text when it sent one.
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// A backend plot that could not be decoded or written.
#[derive(Debug, Error)]
pub enum PlotError {
    #[error("not a data: URI")]
    NotDataUri,

    #[error("data: URI has no payload")]
    MissingPayload,

    #[error("unsupported data: encoding '{0}'")]
    UnsupportedEncoding(String),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("{plot} plot: {source}")]
    Invalid {
        plot: &'static str,
        source: Box<PlotError>,
    },

    #[error("cannot write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Failure drawing onto a chart surface.
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("drawing failed: {0}")]
    Draw(String),

    #[error("no TrueType font available")]
    NoFont,
}
