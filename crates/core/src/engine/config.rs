//! Dispatcher configuration.

use std::path::PathBuf;
use std::time::Duration;

use super::backoff::BackoffPolicy;
use crate::config::Config;

/// Runtime settings for the download dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Directory every provider writes into.
    pub download_dir: PathBuf,
    pub backoff: BackoffPolicy,
    /// Timeout applied to each provider attempt.
    pub attempt_timeout: Duration,
    /// Maximum jobs downloading at once (0 = unlimited).
    /// Jobs over the limit wait in `Queued`.
    pub max_concurrent: usize,
    /// Capacity of the event broadcast channel.
    pub channel_capacity: usize,
}

impl DispatcherConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            download_dir: config.downloads.dir.clone(),
            backoff: BackoffPolicy::from_config(&config.retry),
            attempt_timeout: config.retry.attempt_timeout(),
            max_concurrent: config.jobs.max_concurrent,
            channel_capacity: config.events.channel_capacity.max(1),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
