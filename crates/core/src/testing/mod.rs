//! Testing utilities and mock implementations.
//!
//! The mock provider lets engine and server tests run without yt-dlp or
//! network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use tubeline_core::testing::{fixtures, MockOutcome, MockProvider};
//!
//! let primary = Arc::new(MockProvider::new("primary").with_progress(vec![25.0, 100.0]));
//! let dispatcher = DownloadDispatcher::new(fixtures::fast_config(dir.path()), primary, None);
//! let id = dispatcher.start(&fixtures::video_url(1))?;
//! ```

mod mock_provider;

pub use mock_provider::{MockOutcome, MockProvider, RecordedDownload};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;
    use std::time::Duration;

    use crate::engine::{BackoffPolicy, DispatcherConfig};
    use crate::job::JobSnapshot;

    /// A valid, distinct YouTube URL for each `n`.
    pub fn video_url(n: u32) -> String {
        format!("https://www.youtube.com/watch?v=test{:07}", n)
    }

    /// Dispatcher config with millisecond backoff, suitable for tests.
    pub fn fast_config(download_dir: &Path) -> DispatcherConfig {
        DispatcherConfig {
            download_dir: download_dir.to_path_buf(),
            backoff: BackoffPolicy::new(3, Duration::from_millis(5), Duration::from_millis(20)),
            attempt_timeout: Duration::from_secs(5),
            max_concurrent: 0,
            channel_capacity: 1024,
        }
    }

    /// Poll `check` until it returns a terminal snapshot or `timeout` passes.
    pub async fn wait_for_terminal<F>(timeout: Duration, mut check: F) -> Option<JobSnapshot>
    where
        F: FnMut() -> Option<JobSnapshot>,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(job) = check().filter(|j| j.is_terminal()) {
                return Some(job);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
