//! Error taxonomy shared by providers, workers and the dispatcher.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classified reason a download failed or was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Input failed the URL allow-list. Never retried.
    InvalidUrl,
    /// Connection, DNS or timeout trouble. Retried.
    Network,
    /// The provider could not extract or fetch the media. Retried a bounded number of times.
    Extraction,
    /// Credentials rejected or sign-in required.
    Auth,
    /// Rate limit or quota exhausted.
    Quota,
    /// Local disk trouble.
    Filesystem,
    /// Canceled by the caller.
    Canceled,
}

impl ErrorKind {
    /// Whether the worker should retry the same provider after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Extraction)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidUrl => "invalid_url",
            ErrorKind::Network => "network",
            ErrorKind::Extraction => "extraction",
            ErrorKind::Auth => "auth",
            ErrorKind::Quota => "quota",
            ErrorKind::Filesystem => "filesystem",
            ErrorKind::Canceled => "canceled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error stored on a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn canceled() -> Self {
        Self::new(ErrorKind::Canceled, "download canceled")
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for JobError {}
