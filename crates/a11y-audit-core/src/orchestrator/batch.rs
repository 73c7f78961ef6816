//! Batch audit orchestration.
//!
//! `submit` stores a `Pending` job and spawns a dispatcher task, then returns
//! the job id without waiting on any scan. The dispatcher spawns one task per
//! target; a semaphore admits at most `concurrency` of them at a time. Every
//! target ends with exactly one recorded outcome, so a job always reaches
//! `Completed`. Progress is read back by polling the store.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{instrument, warn, Instrument};

use crate::domain::{
    AuditError, AuditJob, AuditResult, AuditResultView, JobId, JobStatusView, Result, ScanError,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::orchestrator::pipeline::TargetPipeline;
use crate::orchestrator::store::{JobStore, MemoryJobStore};
use crate::remediation::RemediationRouter;
use crate::renderer::PageRenderer;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Default worker pool size per job.
    pub concurrency_limit: usize,
    pub render_timeout_ms: u64,
    /// How long completed jobs are kept.
    pub retention_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 4,
            render_timeout_ms: 30_000,
            retention_secs: 3_600,
        }
    }
}

impl OrchestratorConfig {
    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

struct JobHandle {
    task: JoinHandle<()>,
    done: watch::Receiver<bool>,
}

pub struct BatchAuditOrchestrator {
    store: Arc<dyn JobStore>,
    pipeline: Arc<TargetPipeline>,
    config: OrchestratorConfig,
    handles: Mutex<HashMap<JobId, JobHandle>>,
}

impl BatchAuditOrchestrator {
    /// Orchestrator backed by an in-memory job store.
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        router: Arc<RemediationRouter>,
        config: OrchestratorConfig,
    ) -> Self {
        Self::with_store(Arc::new(MemoryJobStore::new()), renderer, router, config)
    }

    pub fn with_store(
        store: Arc<dyn JobStore>,
        renderer: Arc<dyn PageRenderer>,
        router: Arc<RemediationRouter>,
        config: OrchestratorConfig,
    ) -> Self {
        let pipeline = Arc::new(TargetPipeline::new(
            renderer,
            router,
            config.render_timeout(),
        ));
        Self {
            store,
            pipeline,
            config,
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Create a job for `targets` and start scanning in the background.
    ///
    /// Duplicate URLs are scanned once. `concurrency` overrides the
    /// configured limit for this job.
    #[instrument(skip(self, targets), fields(targets = targets.len()))]
    pub async fn submit(&self, targets: Vec<String>, concurrency: Option<usize>) -> Result<JobId> {
        let concurrency = concurrency.unwrap_or(self.config.concurrency_limit);
        if concurrency == 0 {
            return Err(AuditError::InvalidSubmission(
                "concurrency limit must be at least 1".to_string(),
            ));
        }
        let targets = dedup_targets(targets)?;

        self.purge_expired().await?;

        let job_id = JobId::new();
        self.store
            .create(AuditJob::new(job_id.clone(), targets.clone(), Utc::now()))
            .await?;
        obs::emit_job_submitted(&job_id.0, targets.len(), concurrency);

        let (done_tx, done_rx) = watch::channel(false);
        let task = tokio::spawn(
            run_job(
                Arc::clone(&self.store),
                Arc::clone(&self.pipeline),
                job_id.clone(),
                targets,
                concurrency,
                done_tx,
            )
            .instrument(obs::job_span(&job_id.0)),
        );

        self.lock_handles().insert(
            job_id.clone(),
            JobHandle {
                task,
                done: done_rx,
            },
        );
        Ok(job_id)
    }

    pub async fn get_status(&self, job_id: &JobId) -> Result<JobStatusView> {
        Ok(self.store.get(job_id).await?.status_view())
    }

    /// Results recorded so far, in submission order. Partial while the job
    /// is running.
    pub async fn get_results(&self, job_id: &JobId) -> Result<Vec<AuditResult>> {
        Ok(self.store.get(job_id).await?.ordered_results())
    }

    pub async fn get_result_views(&self, job_id: &JobId) -> Result<Vec<AuditResultView>> {
        Ok(self
            .get_results(job_id)
            .await?
            .iter()
            .map(AuditResultView::from)
            .collect())
    }

    /// Wait until the job's dispatcher has finished.
    pub async fn wait(&self, job_id: &JobId) -> Result<JobStatusView> {
        let done = self
            .lock_handles()
            .get(job_id)
            .map(|handle| handle.done.clone());
        if let Some(mut done) = done {
            if done.wait_for(|finished| *finished).await.is_err() {
                warn!(job_id = %job_id, "job dispatcher exited without signalling completion");
            }
        }
        self.get_status(job_id).await
    }

    /// Evict completed jobs past the retention window.
    pub async fn purge_expired(&self) -> Result<usize> {
        let purged = self
            .store
            .purge_expired(Utc::now(), self.config.retention())
            .await?;
        let mut handles = self.lock_handles();
        for id in &purged {
            handles.remove(id);
        }
        handles.retain(|_, handle| !(handle.task.is_finished() && *handle.done.borrow()));
        Ok(purged.len())
    }

    fn lock_handles(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, JobHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn dedup_targets(targets: Vec<String>) -> Result<Vec<String>> {
    if targets.is_empty() {
        return Err(AuditError::InvalidSubmission(
            "at least one target is required".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(targets.len());
    for target in targets {
        let target = target.trim().to_string();
        if target.is_empty() {
            return Err(AuditError::InvalidSubmission(
                "target url must not be blank".to_string(),
            ));
        }
        if seen.insert(target.clone()) {
            unique.push(target);
        }
    }
    Ok(unique)
}

async fn run_job(
    store: Arc<dyn JobStore>,
    pipeline: Arc<TargetPipeline>,
    job_id: JobId,
    targets: Vec<String>,
    concurrency: usize,
    done: watch::Sender<bool>,
) {
    let started = Instant::now();
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut join_set = JoinSet::new();

    for url in targets.iter().cloned() {
        let store = Arc::clone(&store);
        let pipeline = Arc::clone(&pipeline);
        let semaphore = Arc::clone(&semaphore);
        let job_id = job_id.clone();
        join_set.spawn(
            async move {
                let _permit = semaphore.acquire_owned().await.ok();
                if let Err(e) = store.mark_running(&job_id).await {
                    warn!(error = %e, "failed to mark job running");
                }
                let result = pipeline.audit(&url).await;
                record(store.as_ref(), &job_id, result).await;
            }
            .in_current_span(),
        );
    }

    while let Some(joined) = join_set.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "target task did not complete");
        }
    }

    // A panicked target task leaves no outcome; record one so the job
    // still completes.
    if let Ok(job) = store.get(&job_id).await {
        for url in targets.iter().filter(|u| !job.results.contains_key(*u)) {
            let result = AuditResult::failed(
                url.clone(),
                ScanError::RenderError("scan task aborted".to_string()),
                0,
            );
            record(store.as_ref(), &job_id, result).await;
        }
    }

    match store.get(&job_id).await {
        Ok(job) => obs::emit_job_completed(
            &job_id.0,
            job.progress.completed,
            job.progress.failed,
            started.elapsed().as_millis() as u64,
        ),
        Err(e) => warn!(error = %e, "job vanished before completion"),
    }
    METRICS.flush();
    let _ = done.send(true);
}

async fn record(store: &dyn JobStore, job_id: &JobId, result: AuditResult) {
    let url = result.url.clone();
    let violations = result.violations.len();
    let duration_ms = result.scan_duration_ms;
    let error = result.scan_error.as_ref().map(|e| {
        AuditError::RenderFailure {
            url: url.clone(),
            reason: e.to_string(),
        }
        .to_string()
    });

    if error.is_some() {
        METRICS.inc_targets_failed();
    } else {
        METRICS.inc_targets_scanned();
    }
    obs::emit_target_finished(&job_id.0, &url, violations, duration_ms, error.as_deref());

    if let Err(e) = store.record_result(job_id, result).await {
        warn!(url = %url, error = %e, "failed to record target result");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_targets_preserves_order() {
        let targets = dedup_targets(vec![
            "https://b.example".to_string(),
            " https://a.example ".to_string(),
            "https://b.example".to_string(),
        ])
        .unwrap();
        assert_eq!(targets, vec!["https://b.example", "https://a.example"]);
    }

    #[test]
    fn test_dedup_targets_rejects_empty_and_blank() {
        assert!(matches!(
            dedup_targets(vec![]),
            Err(AuditError::InvalidSubmission(_))
        ));
        assert!(matches!(
            dedup_targets(vec!["  ".to_string()]),
            Err(AuditError::InvalidSubmission(_))
        ));
    }

    #[test]
    fn test_config_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.concurrency_limit, 4);
        assert_eq!(config.render_timeout(), Duration::from_secs(30));
        assert_eq!(config.retention(), Duration::from_secs(3600));
    }
}
