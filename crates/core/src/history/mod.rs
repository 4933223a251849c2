//! Optional persistent history of finished jobs.

mod sqlite;

use thiserror::Error;

use crate::job::{JobId, JobSnapshot};

pub use sqlite::SqliteJobHistory;

/// Errors that can occur when reading or writing history.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Only terminal snapshots are recorded.
    #[error("job {0} is not finished")]
    NotFinished(JobId),
}

/// Sink for terminal job snapshots.
pub trait JobHistory: Send + Sync {
    /// Append a finished job. Recording the same job twice keeps the latest copy.
    fn record(&self, job: &JobSnapshot) -> Result<(), HistoryError>;

    /// Most recently finished jobs first.
    fn recent(&self, limit: usize) -> Result<Vec<JobSnapshot>, HistoryError>;

    fn count(&self) -> Result<u64, HistoryError>;
}
