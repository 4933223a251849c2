//! Mock download provider for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::provider::{
    safe_title, DownloadOutcome, ProgressSink, ProgressUpdate, Provider, ProviderError,
};

/// A recorded download call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedDownload {
    pub url: String,
    pub dest_dir: PathBuf,
    pub timestamp: chrono::DateTime<Utc>,
}

/// What one scripted attempt does after emitting its progress steps.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Return a file named after `title` inside the destination directory.
    Succeed { title: String },
    Fail(ProviderError),
    /// Never return; only an attempt timeout ends it.
    Hang,
}

impl MockOutcome {
    pub fn succeed(title: impl Into<String>) -> Self {
        MockOutcome::Succeed {
            title: title.into(),
        }
    }

    pub fn fail(error: ProviderError) -> Self {
        MockOutcome::Fail(error)
    }
}

/// Mock implementation of the Provider trait.
///
/// Provides controllable behavior for testing:
/// - Script the outcome of each attempt in order
/// - Emit progress steps before finishing
/// - Add latency to every attempt
/// - Record every call
///
/// # Example
///
/// ```rust,ignore
/// let primary = MockProvider::new("primary").with_script(vec![
///     MockOutcome::fail(ProviderError::network("reset")),
///     MockOutcome::succeed("Video"),
/// ]);
///
/// // First attempt fails, second succeeds
/// assert_eq!(primary.call_count().await, 0);
/// ```
pub struct MockProvider {
    name: String,
    /// Outcomes consumed one per attempt.
    script: Arc<RwLock<VecDeque<MockOutcome>>>,
    /// Used once the script is empty.
    fallback: Arc<RwLock<MockOutcome>>,
    /// Percent values emitted at the start of every attempt.
    progress_steps: Arc<RwLock<Vec<f32>>>,
    /// Latency added before the outcome.
    delay: Arc<RwLock<Duration>>,
    calls: Arc<RwLock<Vec<RecordedDownload>>>,
    last_sink: Arc<RwLock<Option<ProgressSink>>>,
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl MockProvider {
    /// A provider that succeeds on every attempt.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Arc::new(RwLock::new(VecDeque::new())),
            fallback: Arc::new(RwLock::new(MockOutcome::succeed("Mock Video"))),
            progress_steps: Arc::new(RwLock::new(Vec::new())),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
            calls: Arc::new(RwLock::new(Vec::new())),
            last_sink: Arc::new(RwLock::new(None)),
        }
    }

    /// A provider that fails every attempt with `error`.
    pub fn failing(name: impl Into<String>, error: ProviderError) -> Self {
        Self::new(name).with_fallback(MockOutcome::Fail(error))
    }

    pub fn with_script(self, outcomes: Vec<MockOutcome>) -> Self {
        Self {
            script: Arc::new(RwLock::new(outcomes.into())),
            ..self
        }
    }

    pub fn with_fallback(self, outcome: MockOutcome) -> Self {
        Self {
            fallback: Arc::new(RwLock::new(outcome)),
            ..self
        }
    }

    pub fn with_progress(self, steps: Vec<f32>) -> Self {
        Self {
            progress_steps: Arc::new(RwLock::new(steps)),
            ..self
        }
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        Self {
            delay: Arc::new(RwLock::new(delay)),
            ..self
        }
    }

    /// Append outcomes to the script.
    pub async fn push_outcomes(&self, outcomes: impl IntoIterator<Item = MockOutcome>) {
        self.script.write().await.extend(outcomes);
    }

    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// Get all recorded download calls.
    pub async fn calls(&self) -> Vec<RecordedDownload> {
        self.calls.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// The progress sink handed to the most recent attempt.
    pub async fn last_sink(&self) -> Option<ProgressSink> {
        self.last_sink.read().await.clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        progress: ProgressSink,
    ) -> Result<DownloadOutcome, ProviderError> {
        self.calls.write().await.push(RecordedDownload {
            url: url.to_string(),
            dest_dir: dest_dir.to_path_buf(),
            timestamp: Utc::now(),
        });
        *self.last_sink.write().await = Some(Arc::clone(&progress));

        let outcome = match self.script.write().await.pop_front() {
            Some(outcome) => outcome,
            None => self.fallback.read().await.clone(),
        };

        let steps = self.progress_steps.read().await.clone();
        for percent in steps {
            progress(
                ProgressUpdate::new(percent)
                    .with_speed("1.00MiB/s")
                    .with_eta("00:01"),
            );
            tokio::task::yield_now().await;
        }

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match outcome {
            MockOutcome::Succeed { title } => Ok(DownloadOutcome {
                file_path: dest_dir.join(format!("{}.mp4", safe_title(&title))),
                title,
            }),
            MockOutcome::Fail(error) => Err(error),
            MockOutcome::Hang => {
                std::future::pending::<()>().await;
                Err(ProviderError::network("unreachable"))
            }
        }
    }
}
