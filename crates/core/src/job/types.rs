//! Core job data types.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// Opaque job identifier (UUID v4 string).
pub type JobId = String;

/// Public lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, waiting for its worker to begin.
    Queued,
    /// A provider attempt (or the wait between attempts) is in progress.
    Downloading,
    /// Finished with a file on disk (terminal).
    Completed,
    /// Finished without a file (terminal).
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self -> next` is a legal edge of the lifecycle.
    ///
    /// `Downloading -> Downloading` is legal: it is how a retry or a fallback
    /// to the secondary provider shows up from the outside.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            JobStatus::Queued => matches!(next, JobStatus::Downloading | JobStatus::Failed),
            JobStatus::Downloading => !matches!(next, JobStatus::Queued),
            JobStatus::Completed | JobStatus::Failed => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Downloading => "downloading",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// Which provider produced (or last attempted) the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderSlot {
    #[default]
    None,
    Primary,
    Secondary,
}

impl ProviderSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderSlot::None => "none",
            ProviderSlot::Primary => "primary",
            ProviderSlot::Secondary => "secondary",
        }
    }
}

/// Last known progress of the active attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    /// 0.0 - 100.0
    pub percent: f32,
    /// Human readable speed, e.g. "1.20MiB/s".
    pub speed: String,
    /// Human readable ETA, e.g. "00:07".
    pub eta: String,
}

impl Default for JobProgress {
    fn default() -> Self {
        Self {
            percent: 0.0,
            speed: "N/A".to_string(),
            eta: "N/A".to_string(),
        }
    }
}

/// Where the finished file landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub file_path: PathBuf,
    pub title: String,
}

/// A download job as stored in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub url: String,
    pub status: JobStatus,
    pub provider: ProviderSlot,
    /// Primary attempts made so far.
    pub attempt: u32,
    pub progress: JobProgress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    /// Last primary failure, kept for the composite failure message.
    #[serde(skip)]
    pub primary_error: Option<JobError>,
    #[serde(skip)]
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Owned point-in-time copy of a job handed out to readers.
pub type JobSnapshot = Job;

impl Job {
    /// Create a queued job with a fresh id.
    pub fn new(url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            status: JobStatus::Queued,
            provider: ProviderSlot::None,
            attempt: 0,
            progress: JobProgress::default(),
            result: None,
            error: None,
            primary_error: None,
            cancel_requested: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn set_status(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        true
    }

    /// Enter `Downloading` for a new attempt on `slot`, resetting progress.
    ///
    /// Returns false if the job is already terminal.
    pub fn begin_attempt(&mut self, slot: ProviderSlot) -> bool {
        if !self.set_status(JobStatus::Downloading) {
            return false;
        }
        if slot == ProviderSlot::Primary {
            self.attempt += 1;
        }
        self.provider = slot;
        self.progress = JobProgress::default();
        true
    }

    /// Apply a progress update from the active attempt.
    ///
    /// Percent is clamped to 0..=100 and never decreases within an attempt.
    /// Returns the stored progress, or None if the job is not downloading.
    pub fn apply_progress(&mut self, percent: f32, speed: &str, eta: &str) -> Option<JobProgress> {
        if self.status != JobStatus::Downloading {
            return None;
        }
        let percent = if percent.is_finite() {
            percent.clamp(0.0, 100.0)
        } else {
            0.0
        };
        self.progress = JobProgress {
            percent: percent.max(self.progress.percent),
            speed: speed.to_string(),
            eta: eta.to_string(),
        };
        self.updated_at = Utc::now();
        Some(self.progress.clone())
    }

    /// Mark the job completed. Returns false if already terminal.
    pub fn complete(&mut self, slot: ProviderSlot, result: JobResult) -> bool {
        if !self.set_status(JobStatus::Completed) {
            return false;
        }
        self.provider = slot;
        self.progress.percent = 100.0;
        self.result = Some(result);
        self.error = None;
        true
    }

    /// Mark the job failed. Returns false if already terminal.
    pub fn fail(&mut self, error: JobError) -> bool {
        if !self.set_status(JobStatus::Failed) {
            return false;
        }
        self.result = None;
        self.error = Some(error);
        true
    }
}

/// Number of jobs in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub queued: usize,
    pub downloading: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobCounts {
    pub fn record(&mut self, status: JobStatus) {
        match status {
            JobStatus::Queued => self.queued += 1,
            JobStatus::Downloading => self.downloading += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.queued + self.downloading + self.completed + self.failed
    }

    #[cfg(test)]
    pub(crate) fn active(&self) -> usize {
        self.queued + self.downloading
    }
}
