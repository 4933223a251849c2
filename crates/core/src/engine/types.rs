//! Types for the download engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::JobError;
use crate::job::{JobCounts, JobId, JobProgress, JobSnapshot, JobStatus, ProviderSlot};

/// Errors returned synchronously by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Input failed the URL allow-list; no job was created.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The dispatcher no longer accepts jobs.
    #[error("dispatcher is shutting down")]
    ShuttingDown,

    #[error("job not found: {0}")]
    NotFound(JobId),

    /// The job is already completed or failed.
    #[error("job already finished: {0}")]
    AlreadyFinished(JobId),
}

impl From<crate::job::RegistryError> for DispatchError {
    fn from(e: crate::job::RegistryError) -> Self {
        match e {
            crate::job::RegistryError::NotFound(id) => DispatchError::NotFound(id),
        }
    }
}

/// A point-in-time progress sample for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub percent: f32,
    pub speed: String,
    pub eta: String,
}

impl ProgressEvent {
    pub fn new(job_id: impl Into<JobId>, progress: JobProgress) -> Self {
        Self {
            job_id: job_id.into(),
            percent: progress.percent,
            speed: progress.speed,
            eta: progress.eta,
        }
    }
}

/// Event pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Progress(ProgressEvent),
    StatusChanged {
        job_id: JobId,
        status: JobStatus,
        provider: ProviderSlot,
        attempt: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<JobError>,
    },
}

impl JobEvent {
    /// Status event describing the current state of `job`.
    pub fn status_of(job: &JobSnapshot) -> Self {
        JobEvent::StatusChanged {
            job_id: job.id.clone(),
            status: job.status,
            provider: job.provider,
            attempt: job.attempt,
            error: job.error.clone(),
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Progress(p) => &p.job_id,
            JobEvent::StatusChanged { job_id, .. } => job_id,
        }
    }
}

/// Current state of the dispatcher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSummary {
    /// Whether new jobs are accepted.
    pub running: bool,
    /// Concurrency bound (0 = unlimited).
    pub max_concurrent: usize,
    pub jobs: JobCounts,
}
