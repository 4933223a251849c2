//! Download dispatcher: validates requests, creates jobs, spawns workers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Notify, Semaphore};
use tracing::{info, warn};

use super::config::DispatcherConfig;
use super::reporter::ProgressReporter;
use super::types::{DispatchError, EngineSummary, JobEvent};
use super::worker::{JobWorker, WorkerContext};
use crate::config::Config;
use crate::history::JobHistory;
use crate::job::{JobId, JobRegistry, JobSnapshot};
use crate::metrics;
use crate::provider::{Provider, ProviderError, RestApiProvider, YtDlpProvider};
use crate::validation::is_supported_url;

/// Entry point of the engine. Cheap to share behind an `Arc`.
pub struct DownloadDispatcher {
    ctx: Arc<WorkerContext>,
    max_concurrent: usize,
    running: AtomicBool,
}

impl DownloadDispatcher {
    /// Create a dispatcher around already-built providers.
    pub fn new(
        config: DispatcherConfig,
        primary: Arc<dyn Provider>,
        secondary: Option<Arc<dyn Provider>>,
    ) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let reporter = Arc::new(ProgressReporter::new(
            Arc::clone(&registry),
            config.channel_capacity,
        ));
        let limiter = (config.max_concurrent > 0)
            .then(|| Arc::new(Semaphore::new(config.max_concurrent)));

        Self {
            ctx: Arc::new(WorkerContext {
                registry,
                reporter,
                primary,
                secondary,
                history: None,
                backoff: config.backoff,
                attempt_timeout: config.attempt_timeout,
                download_dir: config.download_dir,
                limiter,
                active: Mutex::new(HashMap::new()),
            }),
            max_concurrent: config.max_concurrent,
            running: AtomicBool::new(true),
        }
    }

    /// Build the yt-dlp primary and, when enabled, the REST secondary from config.
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let primary: Arc<dyn Provider> =
            Arc::new(YtDlpProvider::new(config.providers.primary.clone()));
        let secondary: Option<Arc<dyn Provider>> = match &config.providers.secondary {
            Some(rest) if rest.enabled => Some(Arc::new(RestApiProvider::new(rest.clone())?)),
            _ => None,
        };
        Ok(Self::new(
            DispatcherConfig::from_config(config),
            primary,
            secondary,
        ))
    }

    /// Record every terminal snapshot in `history`.
    ///
    /// Must be called before the dispatcher is shared.
    pub fn with_history(mut self, history: Arc<dyn JobHistory>) -> Self {
        match Arc::get_mut(&mut self.ctx) {
            Some(ctx) => ctx.history = Some(history),
            None => warn!("Dispatcher already shared, history not attached"),
        }
        self
    }

    pub fn history(&self) -> Option<Arc<dyn JobHistory>> {
        self.ctx.history.clone()
    }

    pub fn has_secondary(&self) -> bool {
        self.ctx.secondary.is_some()
    }

    /// Validate `url`, create a queued job and start its worker.
    ///
    /// Returns as soon as the job exists; all network work happens in the
    /// spawned worker. Must be called from within a tokio runtime.
    pub fn start(&self, url: &str) -> Result<JobId, DispatchError> {
        let url = url.trim();
        if !is_supported_url(url) {
            return Err(DispatchError::InvalidUrl(url.to_string()));
        }

        // The active map lock orders this against `shutdown`: a job is either
        // rejected here or visible to the shutdown sweep.
        let mut active = self.ctx.active();
        if !self.running.load(Ordering::SeqCst) {
            drop(active);
            metrics::JOBS_REJECTED
                .with_label_values(&["shutting_down"])
                .inc();
            return Err(DispatchError::ShuttingDown);
        }

        let job = self.ctx.registry.create(url);
        let cancel = Arc::new(Notify::new());
        active.insert(job.id.clone(), Arc::clone(&cancel));
        drop(active);
        self.ctx.reporter.publish_status(&job);

        metrics::JOBS_STARTED.inc();
        info!(job_id = %job.id, url = %job.url, "Download job queued");

        let worker = JobWorker::new(
            Arc::clone(&self.ctx),
            job.id.clone(),
            job.url.clone(),
            cancel,
        );
        tokio::spawn(worker.run());

        Ok(job.id)
    }

    pub fn status(&self, job_id: &str) -> Result<JobSnapshot, DispatchError> {
        Ok(self.ctx.registry.get(job_id)?)
    }

    /// All jobs in submission order.
    pub fn list(&self) -> Vec<JobSnapshot> {
        self.ctx.registry.list()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.ctx.reporter.subscribe()
    }

    /// Ask a job to stop. The worker fails it with `Canceled` at its next
    /// checkpoint; an attempt already running is allowed to finish.
    pub fn cancel(&self, job_id: &str) -> Result<(), DispatchError> {
        let accepted = self.ctx.registry.update(job_id, |job| {
            if job.is_terminal() {
                false
            } else {
                job.cancel_requested = true;
                true
            }
        })?;
        if !accepted {
            return Err(DispatchError::AlreadyFinished(job_id.to_string()));
        }

        if let Some(signal) = self.ctx.active().get(job_id) {
            signal.notify_one();
        }
        info!(job_id = %job_id, "Cancel requested");
        Ok(())
    }

    /// Drop finished jobs last updated more than `older_than` ago.
    pub fn purge_finished(&self, older_than: Duration) -> usize {
        let age = chrono::Duration::from_std(older_than).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(age)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        let removed = self.ctx.registry.purge_finished(cutoff);
        if removed > 0 {
            info!(removed, "Purged finished jobs");
        }
        removed
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn summary(&self) -> EngineSummary {
        EngineSummary {
            running: self.is_running(),
            max_concurrent: self.max_concurrent,
            jobs: self.ctx.registry.counts(),
        }
    }

    /// Stop accepting jobs and cancel every unfinished one.
    pub fn shutdown(&self) {
        let active: Vec<JobId> = {
            let active = self.ctx.active();
            if !self.running.swap(false, Ordering::SeqCst) {
                warn!("Dispatcher already shut down");
                return;
            }
            active.keys().cloned().collect()
        };
        info!(active = active.len(), "Shutting down dispatcher");
        for job_id in active {
            if let Err(e) = self.cancel(&job_id) {
                warn!(job_id = %job_id, error = %e, "Failed to cancel job during shutdown");
            }
        }
    }
}
