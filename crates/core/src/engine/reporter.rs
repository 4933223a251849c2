//! Progress reporter: provider callbacks → registry update + broadcast.
//!
//! Events are published while the job's record is locked, so subscribers see
//! each job's events in the same order the record went through them.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use super::types::{JobEvent, ProgressEvent};
use crate::job::{Job, JobRegistry, JobSnapshot};
use crate::metrics;
use crate::provider::{ProgressSink, ProgressUpdate};

/// Default broadcast capacity.
const DEFAULT_CAPACITY: usize = 256;

/// Bridges provider progress into the registry and to subscribers.
pub struct ProgressReporter {
    registry: Arc<JobRegistry>,
    events: broadcast::Sender<JobEvent>,
}

impl ProgressReporter {
    pub fn new(registry: Arc<JobRegistry>, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self { registry, events }
    }

    pub fn with_default_capacity(registry: Arc<JobRegistry>) -> Self {
        Self::new(registry, DEFAULT_CAPACITY)
    }

    /// Subscribe to every job event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Record a progress sample and publish it.
    ///
    /// Returns false (and publishes nothing) when the job is unknown or not
    /// downloading.
    pub fn on_progress(&self, job_id: &str, percent: f32, speed: &str, eta: &str) -> bool {
        let published = self
            .registry
            .update(job_id, |job| {
                let progress = job.apply_progress(percent, speed, eta)?;
                // No subscribers is not an error.
                let _ = self
                    .events
                    .send(JobEvent::Progress(ProgressEvent::new(job.id.clone(), progress)));
                Some(())
            })
            .ok()
            .flatten()
            .is_some();

        if published {
            metrics::PROGRESS_EVENTS.inc();
            trace!(job_id = %job_id, percent, "Progress published");
        }
        published
    }

    /// Apply a status mutation and publish the resulting state.
    ///
    /// `mutator` returns whether it changed anything; nothing is published
    /// when it returns false. Returns the snapshot after the change.
    pub fn transition(
        &self,
        job_id: &str,
        mutator: impl FnOnce(&mut Job) -> bool,
    ) -> Option<JobSnapshot> {
        self.registry
            .update(job_id, |job| {
                if !mutator(job) {
                    return None;
                }
                let snapshot = job.clone();
                let _ = self.events.send(JobEvent::status_of(&snapshot));
                Some(snapshot)
            })
            .ok()
            .flatten()
    }

    /// Publish the current state of a job without changing it.
    pub fn publish_status(&self, job: &JobSnapshot) {
        let _ = self.events.send(JobEvent::status_of(job));
    }

    /// Progress sink bound to one job, handed to a provider attempt.
    pub fn sink_for(self: &Arc<Self>, job_id: &str) -> ProgressSink {
        let reporter = Arc::clone(self);
        let job_id = job_id.to_string();
        Arc::new(move |update: ProgressUpdate| {
            reporter.on_progress(&job_id, update.percent, &update.speed, &update.eta);
        })
    }
}
