//! Types for provider adapters.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ErrorKind, JobError};

/// A classified failure from a single download attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Extraction, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn quota(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Quota, message)
    }

    pub fn filesystem(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Filesystem, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<ProviderError> for JobError {
    fn from(e: ProviderError) -> Self {
        JobError::new(e.kind, e.message)
    }
}

/// A successful download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOutcome {
    /// Absolute or destination-relative path of the finished file.
    pub file_path: PathBuf,
    pub title: String,
}

/// One progress sample emitted by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub percent: f32,
    pub speed: String,
    pub eta: String,
}

impl ProgressUpdate {
    pub fn new(percent: f32) -> Self {
        Self {
            percent,
            speed: "N/A".to_string(),
            eta: "N/A".to_string(),
        }
    }

    pub fn with_speed(mut self, speed: impl Into<String>) -> Self {
        self.speed = speed.into();
        self
    }

    pub fn with_eta(mut self, eta: impl Into<String>) -> Self {
        self.eta = eta.into();
        self
    }
}

/// Callback a provider invokes for every progress sample.
pub type ProgressSink = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// A backend that can fetch one video into a directory.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short name used in logs, metrics and failure messages.
    fn name(&self) -> &str;

    /// Perform one download attempt.
    async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        progress: ProgressSink,
    ) -> Result<DownloadOutcome, ProviderError>;
}

/// Make a filesystem-safe stem out of a video title.
///
/// Every character outside `[A-Za-z0-9_-]` becomes `_`; the result is at most
/// 100 characters.
pub fn safe_title(title: &str) -> String {
    let safe: String = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(100)
        .collect();
    if safe.is_empty() {
        "video".to_string()
    } else {
        safe
    }
}

/// Map an I/O error from local disk work to a provider error.
pub(crate) fn io_error(context: &str, e: std::io::Error) -> ProviderError {
    ProviderError::filesystem(format!("{}: {}", context, e))
}
