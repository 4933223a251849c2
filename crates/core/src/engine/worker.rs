//! Per-job worker: drives primary attempts, backoff and fallback.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use super::backoff::{BackoffPolicy, GiveUpReason, RetryDecision};
use super::reporter::ProgressReporter;
use crate::error::JobError;
use crate::history::JobHistory;
use crate::job::{JobId, JobRegistry, JobResult, ProviderSlot};
use crate::metrics;
use crate::provider::{DownloadOutcome, Provider, ProviderError};

/// Everything workers share, owned by the dispatcher.
pub(crate) struct WorkerContext {
    pub registry: Arc<JobRegistry>,
    pub reporter: Arc<ProgressReporter>,
    pub primary: Arc<dyn Provider>,
    pub secondary: Option<Arc<dyn Provider>>,
    pub history: Option<Arc<dyn JobHistory>>,
    pub backoff: BackoffPolicy,
    pub attempt_timeout: Duration,
    pub download_dir: PathBuf,
    /// Present when `max_concurrent > 0`.
    pub limiter: Option<Arc<Semaphore>>,
    /// Cancel signal per unfinished job.
    pub active: Mutex<HashMap<JobId, Arc<Notify>>>,
}

impl WorkerContext {
    pub fn active(&self) -> MutexGuard<'_, HashMap<JobId, Arc<Notify>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// How a job ended.
enum Outcome {
    Completed(ProviderSlot, DownloadOutcome),
    Failed(JobError),
}

/// Owns one job from creation to its terminal state.
pub(crate) struct JobWorker {
    ctx: Arc<WorkerContext>,
    job_id: JobId,
    url: String,
    cancel: Arc<Notify>,
}

impl JobWorker {
    pub fn new(ctx: Arc<WorkerContext>, job_id: JobId, url: String, cancel: Arc<Notify>) -> Self {
        Self {
            ctx,
            job_id,
            url,
            cancel,
        }
    }

    pub async fn run(self) {
        let _permit = self.acquire_permit().await;

        if let Some(outcome) = self.drive().await {
            self.finish(outcome);
        }
        self.ctx.active().remove(&self.job_id);
    }

    /// Wait for a concurrency slot. A cancel wakes the wait early.
    async fn acquire_permit(&self) -> Option<OwnedSemaphorePermit> {
        let limiter = Arc::clone(self.ctx.limiter.as_ref()?);
        if self.is_canceled() {
            return None;
        }
        debug!(
            job_id = %self.job_id,
            available = limiter.available_permits(),
            "Waiting for download slot"
        );
        tokio::select! {
            permit = limiter.acquire_owned() => permit.ok(),
            _ = self.cancel.notified() => None,
        }
    }

    fn is_canceled(&self) -> bool {
        self.ctx
            .registry
            .get(&self.job_id)
            .map(|job| job.cancel_requested)
            .unwrap_or(true)
    }

    /// Run attempts until the job has an outcome.
    ///
    /// Returns None if the job disappeared or was finished elsewhere.
    async fn drive(&self) -> Option<Outcome> {
        let ctx = &self.ctx;

        let (primary_error, reason) = loop {
            if self.is_canceled() {
                return Some(Outcome::Failed(JobError::canceled()));
            }

            let attempt = ctx
                .reporter
                .transition(&self.job_id, |job| job.begin_attempt(ProviderSlot::Primary))?
                .attempt;

            let error = match self
                .attempt(ProviderSlot::Primary, ctx.primary.as_ref(), attempt)
                .await
            {
                Ok(outcome) => return Some(Outcome::Completed(ProviderSlot::Primary, outcome)),
                Err(e) => e,
            };

            let stored = JobError::from(error.clone());
            let _ = ctx
                .registry
                .update(&self.job_id, |job| job.primary_error = Some(stored));

            match ctx.backoff.decide(attempt, error.kind) {
                RetryDecision::RetryAfter(delay) => {
                    if self.is_canceled() {
                        return Some(Outcome::Failed(JobError::canceled()));
                    }
                    metrics::PRIMARY_RETRIES.inc();
                    warn!(
                        job_id = %self.job_id,
                        attempt,
                        max_attempts = ctx.backoff.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Primary attempt failed, retrying"
                    );
                    self.backoff_wait(delay).await;
                }
                RetryDecision::GiveUp(reason) => break (error, reason),
            }
        };

        let Some(secondary) = ctx.secondary.as_ref() else {
            error!(
                job_id = %self.job_id,
                error = %primary_error,
                "Primary failed and no secondary provider is configured"
            );
            return Some(Outcome::Failed(primary_error.into()));
        };

        if self.is_canceled() {
            return Some(Outcome::Failed(JobError::canceled()));
        }

        metrics::FALLBACKS.with_label_values(&[reason.as_str()]).inc();
        warn!(
            job_id = %self.job_id,
            reason = reason.as_str(),
            primary = ctx.primary.name(),
            secondary = secondary.name(),
            error = %primary_error,
            "Falling back to secondary provider"
        );

        let attempt = ctx
            .reporter
            .transition(&self.job_id, |job| job.begin_attempt(ProviderSlot::Secondary))?
            .attempt;

        match self
            .attempt(ProviderSlot::Secondary, secondary.as_ref(), attempt)
            .await
        {
            Ok(outcome) => Some(Outcome::Completed(ProviderSlot::Secondary, outcome)),
            Err(secondary_error) => Some(Outcome::Failed(composite_error(
                ctx.primary.name(),
                &primary_error,
                secondary.name(),
                &secondary_error,
            ))),
        }
    }

    /// One provider call under the attempt timeout.
    async fn attempt(
        &self,
        slot: ProviderSlot,
        provider: &dyn Provider,
        attempt: u32,
    ) -> Result<DownloadOutcome, ProviderError> {
        let ctx = &self.ctx;
        info!(
            job_id = %self.job_id,
            provider = provider.name(),
            slot = slot.as_str(),
            attempt,
            "Starting download attempt"
        );

        let sink = ctx.reporter.sink_for(&self.job_id);
        let started = Instant::now();
        let result = match tokio::time::timeout(
            ctx.attempt_timeout,
            provider.download(&self.url, &ctx.download_dir, sink),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::network(format!(
                "attempt timed out after {:?}",
                ctx.attempt_timeout
            ))),
        };
        let elapsed = started.elapsed();

        let label = match &result {
            Ok(_) => "success",
            Err(e) => e.kind.as_str(),
        };
        metrics::ATTEMPT_DURATION
            .with_label_values(&[slot.as_str(), label])
            .observe(elapsed.as_secs_f64());

        match &result {
            Ok(outcome) => info!(
                job_id = %self.job_id,
                provider = provider.name(),
                attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                file = %outcome.file_path.display(),
                "Download attempt succeeded"
            ),
            Err(e) => warn!(
                job_id = %self.job_id,
                provider = provider.name(),
                attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                kind = e.kind.as_str(),
                error = %e.message,
                "Download attempt failed"
            ),
        }
        result
    }

    /// Sleep between primary attempts. A cancel wakes it early; the next
    /// checkpoint turns that into a failure.
    async fn backoff_wait(&self, delay: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.cancel.notified() => {
                debug!(job_id = %self.job_id, "Backoff interrupted by cancel");
            }
        }
    }

    /// Store the terminal state, publish it and record history.
    fn finish(&self, outcome: Outcome) {
        let ctx = &self.ctx;
        let snapshot = ctx.reporter.transition(&self.job_id, |job| match outcome {
            Outcome::Completed(slot, done) => job.complete(
                slot,
                JobResult {
                    file_path: done.file_path,
                    title: done.title,
                },
            ),
            Outcome::Failed(error) => job.fail(error),
        });
        let Some(job) = snapshot else {
            debug!(job_id = %self.job_id, "Job already finished, outcome dropped");
            return;
        };

        let result = match &job.error {
            None => "completed",
            Some(e) if e.kind == crate::error::ErrorKind::Canceled => "canceled",
            Some(_) => "failed",
        };
        metrics::JOBS_FINISHED
            .with_label_values(&[result, job.provider.as_str()])
            .inc();

        match &job.error {
            None => info!(
                job_id = %job.id,
                provider = job.provider.as_str(),
                attempt = job.attempt,
                "Job completed"
            ),
            Some(e) => error!(
                job_id = %job.id,
                provider = job.provider.as_str(),
                attempt = job.attempt,
                error = %e,
                "Job failed"
            ),
        }

        if let Some(history) = &ctx.history {
            if let Err(e) = history.record(&job) {
                metrics::HISTORY_WRITE_ERRORS.inc();
                warn!(job_id = %job.id, error = %e, "Failed to record job history");
            }
        }
    }
}

/// Failure message naming both providers; the kind is the secondary's.
pub(crate) fn composite_error(
    primary_name: &str,
    primary: &ProviderError,
    secondary_name: &str,
    secondary: &ProviderError,
) -> JobError {
    JobError::new(
        secondary.kind,
        format!(
            "primary ({}): {}; secondary ({}): {}",
            primary_name, primary, secondary_name, secondary
        ),
    )
}
