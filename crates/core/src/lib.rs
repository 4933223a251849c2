pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod job;
pub mod metrics;
pub mod provider;
pub mod testing;
pub mod validation;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use engine::{
    BackoffPolicy, DispatchError, DispatcherConfig, DownloadDispatcher, EngineSummary, JobEvent,
    ProgressEvent, ProgressReporter,
};
pub use error::{ErrorKind, JobError};
pub use history::{HistoryError, JobHistory, SqliteJobHistory};
pub use job::{
    JobCounts, JobId, JobProgress, JobRegistry, JobResult, JobSnapshot, JobStatus, ProviderSlot,
};
pub use provider::{
    DownloadOutcome, ProgressSink, ProgressUpdate, Provider, ProviderError, RestApiProvider,
    YtDlpProvider,
};
pub use validation::{is_supported_url, video_id};
