//! In-memory job registry.
//!
//! Records live behind their own mutex so a read-modify-write on one job
//! never waits on another job. The map lock is only taken to find, insert
//! or remove a record handle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::{Job, JobCounts, JobId, JobSnapshot};

/// Error type for registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("job not found: {0}")]
    NotFound(JobId),
}

type Record = Arc<Mutex<Job>>;

#[derive(Default)]
struct RegistryInner {
    /// Insertion order for listing.
    order: Vec<JobId>,
    records: HashMap<JobId, Record>,
}

/// Concurrency-safe store mapping job id to job record.
#[derive(Default)]
pub struct JobRegistry {
    inner: RwLock<RegistryInner>,
}

fn lock(record: &Mutex<Job>) -> MutexGuard<'_, Job> {
    record.lock().unwrap_or_else(PoisonError::into_inner)
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queued job for `url` and return its snapshot.
    pub fn create(&self, url: &str) -> JobSnapshot {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut job = Job::new(url);
        while inner.records.contains_key(&job.id) {
            job = Job::new(url);
        }
        let snapshot = job.clone();
        inner.order.push(job.id.clone());
        inner
            .records
            .insert(job.id.clone(), Arc::new(Mutex::new(job)));
        snapshot
    }

    fn record(&self, id: &str) -> Result<Record, RegistryError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Get a snapshot of a job.
    pub fn get(&self, id: &str) -> Result<JobSnapshot, RegistryError> {
        let record = self.record(id)?;
        let job = lock(&record).clone();
        Ok(job)
    }

    /// Atomically mutate one job and return whatever the mutator returns.
    ///
    /// The mutator must not block: it runs with the record locked.
    pub fn update<R>(
        &self,
        id: &str,
        mutator: impl FnOnce(&mut Job) -> R,
    ) -> Result<R, RegistryError> {
        let record = self.record(id)?;
        let mut job = lock(&record);
        Ok(mutator(&mut job))
    }

    /// Snapshots of every job in insertion order.
    pub fn list(&self) -> Vec<JobSnapshot> {
        let records: Vec<Record> = {
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            inner
                .order
                .iter()
                .filter_map(|id| inner.records.get(id).cloned())
                .collect()
        };
        records.iter().map(|r| lock(r).clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for job in self.list() {
            counts.record(job.status);
        }
        counts
    }

    /// Remove terminal jobs last updated before `cutoff`. Returns how many were removed.
    pub fn purge_finished(&self, cutoff: DateTime<Utc>) -> usize {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let expired: Vec<JobId> = inner
            .records
            .iter()
            .filter(|(_, record)| {
                let job = lock(record);
                job.is_terminal() && job.updated_at < cutoff
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            inner.records.remove(id);
        }
        if !expired.is_empty() {
            inner.order.retain(|id| !expired.contains(id));
        }
        expired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobError;
    use crate::job::{JobStatus, ProviderSlot};
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn test_create_and_get() {
        let registry = JobRegistry::new();
        let job = registry.create("https://youtu.be/dQw4w9WgXcQ");

        let fetched = registry.get(&job.id).unwrap();
        assert_eq!(fetched.url, "https://youtu.be/dQw4w9WgXcQ");
        assert_eq!(fetched.status, JobStatus::Queued);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let registry = JobRegistry::new();
        let err = registry.get("does-not-exist").unwrap_err();
        assert_eq!(err, RegistryError::NotFound("does-not-exist".to_string()));
        assert!(registry
            .update("does-not-exist", |job| job.attempt += 1)
            .is_err());
    }

    #[test]
    fn test_list_preserves_insertion_order() {
        let registry = JobRegistry::new();
        let ids: Vec<_> = (0..5)
            .map(|i| registry.create(&format!("https://youtu.be/{i:011}")).id)
            .collect();
        let listed: Vec<_> = registry.list().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, listed);
    }

    #[test]
    fn test_update_returns_mutator_value() {
        let registry = JobRegistry::new();
        let id = registry.create("u").id;
        let began = registry
            .update(&id, |job| job.begin_attempt(ProviderSlot::Primary))
            .unwrap();
        assert!(began);
        assert_eq!(registry.get(&id).unwrap().attempt, 1);
    }

    #[test]
    fn test_concurrent_updates_are_atomic() {
        let registry = Arc::new(JobRegistry::new());
        let id = registry.create("u").id;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let id = id.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        registry.update(&id, |job| job.attempt += 1).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(registry.get(&id).unwrap().attempt, 4000);
    }

    #[test]
    fn test_concurrent_creates_yield_unique_ids() {
        let registry = Arc::new(JobRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || (0..200).map(|_| registry.create("u").id).collect::<Vec<_>>())
            })
            .collect();

        let mut ids = HashSet::new();
        for h in handles {
            ids.extend(h.join().unwrap());
        }
        assert_eq!(ids.len(), 1600);
        assert_eq!(registry.len(), 1600);
    }

    #[test]
    fn test_poisoned_record_is_recovered() {
        let registry = Arc::new(JobRegistry::new());
        let id = registry.create("u").id;

        let r = Arc::clone(&registry);
        let id2 = id.clone();
        let _ = thread::spawn(move || {
            r.update(&id2, |_| panic!("mutator blew up")).unwrap();
        })
        .join();

        assert!(registry.get(&id).is_ok());
        registry.update(&id, |job| job.attempt = 7).unwrap();
        assert_eq!(registry.get(&id).unwrap().attempt, 7);
    }

    #[test]
    fn test_purge_only_removes_old_terminal_jobs() {
        let registry = JobRegistry::new();
        let done = registry.create("done").id;
        let active = registry.create("active").id;
        registry
            .update(&done, |job| job.fail(JobError::canceled()))
            .unwrap();
        registry
            .update(&active, |job| job.begin_attempt(ProviderSlot::Primary))
            .unwrap();

        let future = Utc::now() + chrono::Duration::seconds(60);
        assert_eq!(registry.purge_finished(future), 1);
        assert!(registry.get(&done).is_err());
        assert!(registry.get(&active).is_ok());
        assert_eq!(registry.list().len(), 1);

        let past = Utc::now() - chrono::Duration::seconds(60);
        assert_eq!(registry.purge_finished(past), 0);
    }

    #[test]
    fn test_counts_by_status() {
        let registry = JobRegistry::new();
        registry.create("a");
        let b = registry.create("b").id;
        registry
            .update(&b, |job| job.begin_attempt(ProviderSlot::Primary))
            .unwrap();
        let counts = registry.counts();
        assert_eq!(counts.queued, 1);
        assert_eq!(counts.downloading, 1);
        assert_eq!(counts.total(), 2);
    }
}
