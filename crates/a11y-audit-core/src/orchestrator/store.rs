//! Job storage.
//!
//! [`MemoryJobStore`] keeps jobs in a process-local map: nothing survives a
//! restart, and completed jobs are evicted by [`JobStore::purge_expired`].
//! A durable backend only needs to implement [`JobStore`].

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{AuditJob, AuditResult, JobId, JobProgress, JobStatus};
use crate::orchestrator::error::{StoreError, StoreResult};

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: AuditJob) -> StoreResult<()>;

    /// `Pending -> Running`; a no-op in any other state.
    async fn mark_running(&self, id: &JobId) -> StoreResult<()>;

    /// Record the single outcome for one target and update progress. The
    /// job becomes `Completed` when every target has an outcome.
    async fn record_result(&self, id: &JobId, result: AuditResult) -> StoreResult<JobProgress>;

    async fn get(&self, id: &JobId) -> StoreResult<AuditJob>;

    /// Evict completed jobs older than `retention`; returns their ids.
    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> StoreResult<Vec<JobId>>;
}

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, AuditJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: AuditJob) -> StoreResult<()> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if jobs.contains_key(&job.id) {
            return Err(StoreError::DuplicateJob(job.id));
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn mark_running(&self, id: &JobId) -> StoreResult<()> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::JobNotFound(id.clone()))?;
        if job.status == JobStatus::Pending {
            job.status = JobStatus::Running;
        }
        Ok(())
    }

    async fn record_result(&self, id: &JobId, result: AuditResult) -> StoreResult<JobProgress> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::JobNotFound(id.clone()))?;

        if !job.submitted_targets.contains(&result.url) {
            return Err(StoreError::UnknownTarget {
                job: id.clone(),
                url: result.url,
            });
        }
        if job.results.contains_key(&result.url) {
            return Err(StoreError::AlreadyRecorded {
                job: id.clone(),
                url: result.url,
            });
        }

        if result.is_failure() {
            job.progress.failed += 1;
        } else {
            job.progress.completed += 1;
        }
        job.results.insert(result.url.clone(), result);

        if job.progress.is_done() {
            job.status = JobStatus::Completed;
            job.completed_at = Some(Utc::now());
        } else if job.status == JobStatus::Pending {
            job.status = JobStatus::Running;
        }
        Ok(job.progress)
    }

    async fn get(&self, id: &JobId) -> StoreResult<AuditJob> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::JobNotFound(id.clone()))
    }

    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> StoreResult<Vec<JobId>> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let expired: Vec<JobId> = jobs
            .values()
            .filter(|job| {
                job.completed_at
                    .and_then(|at| (now - at).to_std().ok())
                    .is_some_and(|age| age >= retention)
            })
            .map(|job| job.id.clone())
            .collect();
        for id in &expired {
            jobs.remove(id);
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ScanError;

    fn job(targets: &[&str]) -> AuditJob {
        AuditJob::new(
            JobId::from("job-1"),
            targets.iter().map(|t| t.to_string()).collect(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate() {
        let store = MemoryJobStore::new();
        store.create(job(&["https://a.example"])).await.unwrap();
        let err = store.create(job(&["https://a.example"])).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateJob(_)));
    }

    #[tokio::test]
    async fn test_record_result_completes_job() {
        let store = MemoryJobStore::new();
        store
            .create(job(&["https://a.example", "https://b.example"]))
            .await
            .unwrap();
        let id = JobId::from("job-1");

        let progress = store
            .record_result(&id, AuditResult::scanned("https://a.example", vec![], 1))
            .await
            .unwrap();
        assert_eq!(progress.completed, 1);
        assert_eq!(store.get(&id).await.unwrap().status, JobStatus::Running);

        let progress = store
            .record_result(
                &id,
                AuditResult::failed("https://b.example", ScanError::RenderTimeout, 1),
            )
            .await
            .unwrap();
        assert_eq!(progress.failed, 1);
        let stored = store.get(&id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_result_is_written_once() {
        let store = MemoryJobStore::new();
        store.create(job(&["https://a.example"])).await.unwrap();
        let id = JobId::from("job-1");
        store
            .record_result(&id, AuditResult::scanned("https://a.example", vec![], 1))
            .await
            .unwrap();
        let err = store
            .record_result(&id, AuditResult::scanned("https://a.example", vec![], 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyRecorded { .. }));

        let err = store
            .record_result(&id, AuditResult::scanned("https://z.example", vec![], 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownTarget { .. }));
    }

    #[tokio::test]
    async fn test_purge_only_evicts_old_completed_jobs() {
        let store = MemoryJobStore::new();
        store.create(job(&["https://a.example"])).await.unwrap();
        let mut pending = job(&["https://b.example"]);
        pending.id = JobId::from("job-2");
        store.create(pending).await.unwrap();
        store
            .record_result(
                &JobId::from("job-1"),
                AuditResult::scanned("https://a.example", vec![], 1),
            )
            .await
            .unwrap();

        let retention = Duration::from_secs(3600);
        let purged = store.purge_expired(Utc::now(), retention).await.unwrap();
        assert!(purged.is_empty());

        let later = Utc::now() + chrono::Duration::hours(2);
        let purged = store.purge_expired(later, retention).await.unwrap();
        assert_eq!(purged, vec![JobId::from("job-1")]);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let store = MemoryJobStore::new();
        let err = store.get(&JobId::from("nope")).await.unwrap_err();
        assert_eq!(err, StoreError::JobNotFound(JobId::from("nope")));
    }
}
