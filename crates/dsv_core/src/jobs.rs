//! Background jobs for long-running version work.
//!
//! One tokio task per submitted job. Callers get a job id back immediately
//! and poll `job()` for the outcome. Precondition checks run before the task
//! is spawned so illegal requests fail synchronously.
//!
//! A task drops its own handle when it finishes. Finished records are kept
//! for `EngineConfig::job_retention` and pruned on the next submit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::batch::{BatchOutcome, BatchReport};
use crate::error::DsvError;
use crate::lifecycle::DataSetVersionService;
use crate::meta::VersionMeta;
use crate::ports::Result;
use crate::types::DataSetVersionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Ingest,
    Mapping,
    ResumeMapping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed { reason: String },
    Cancelled,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub version_id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub batches: Option<BatchReport>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct VersionJobRunner {
    service: Arc<DataSetVersionService>,
    jobs: Arc<RwLock<HashMap<Uuid, JobRecord>>>,
    handles: Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>,
}

impl VersionJobRunner {
    pub fn new(service: Arc<DataSetVersionService>) -> Self {
        Self {
            service,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            handles: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn service(&self) -> &Arc<DataSetVersionService> {
        &self.service
    }

    /// Move a draft into `Mapping` now, then build the rows in the background.
    pub async fn submit_mapping(&self, version_id: Uuid) -> Result<Uuid> {
        self.service.begin_mapping(version_id).await?;
        let service = self.service.clone();
        Ok(self
            .spawn(version_id, JobKind::Mapping, async move {
                service.run_mapping(version_id).await.map(|r| r.batches)
            })
            .await)
    }

    /// Rerun the row build of a version left in `Mapping`, e.g. after a crash.
    pub async fn submit_resume_mapping(&self, version_id: Uuid) -> Result<Uuid> {
        let version = self.service.get_version(version_id).await?;
        if version.status != DataSetVersionStatus::Mapping {
            return Err(DsvError::Conflict(format!(
                "version {version_id} is '{}'; only mapping versions can be resumed",
                version.status
            )));
        }
        let service = self.service.clone();
        Ok(self
            .spawn(version_id, JobKind::ResumeMapping, async move {
                service.run_mapping(version_id).await.map(|r| r.batches)
            })
            .await)
    }

    pub async fn submit_ingest(&self, version_id: Uuid, meta: VersionMeta) -> Result<Uuid> {
        let version = self.service.get_version(version_id).await?;
        if version.status != DataSetVersionStatus::Draft {
            return Err(DsvError::Conflict(format!(
                "version {version_id} is '{}'; snapshots can only be ingested into a draft",
                version.status
            )));
        }
        meta.validate()?;
        let service = self.service.clone();
        Ok(self
            .spawn(version_id, JobKind::Ingest, async move {
                service.ingest_meta(version_id, &meta).await
            })
            .await)
    }

    pub async fn job(&self, job_id: Uuid) -> Result<JobRecord> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or_else(|| DsvError::NotFound(format!("job {job_id} not found")))
    }

    pub async fn jobs_for_version(&self, version_id: Uuid) -> Vec<JobRecord> {
        let jobs = self.jobs.read().await;
        let mut found: Vec<JobRecord> = jobs
            .values()
            .filter(|j| j.version_id == version_id)
            .cloned()
            .collect();
        found.sort_by_key(|j| j.submitted_at);
        found
    }

    /// Wait for a job's task to finish and return its final record.
    /// Works after the task has already released its handle.
    pub async fn wait(&self, job_id: Uuid) -> Result<JobRecord> {
        let handle = self.handles.lock().await.remove(&job_id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(job_id = %job_id, error = %e, "job task panicked");
                self.finish(job_id, JobStatus::Failed { reason: e.to_string() }, None)
                    .await;
            }
        }
        self.job(job_id).await
    }

    async fn spawn<F>(&self, version_id: Uuid, kind: JobKind, work: F) -> Uuid
    where
        F: std::future::Future<Output = Result<BatchReport>> + Send + 'static,
    {
        let job_id = Uuid::now_v7();
        {
            let mut jobs = self.jobs.write().await;
            let pruned = prune_finished(&mut jobs, self.service.config().job_retention);
            if pruned > 0 {
                tracing::debug!(pruned, "expired job records dropped");
            }
            jobs.insert(
                job_id,
                JobRecord {
                    id: job_id,
                    version_id,
                    kind,
                    status: JobStatus::Running,
                    batches: None,
                    submitted_at: Utc::now(),
                    finished_at: None,
                },
            );
        }
        tracing::info!(job_id = %job_id, version_id = %version_id, kind = ?kind, "job submitted");

        // Held across the spawn so the task cannot remove its handle before it is stored.
        let mut handles = self.handles.lock().await;
        let runner = self.clone();
        let handle = tokio::spawn(async move {
            let (status, batches) = match work.await {
                Ok(report) if report.outcome == BatchOutcome::Cancelled => {
                    (JobStatus::Cancelled, Some(report))
                }
                Ok(report) => (JobStatus::Succeeded, Some(report)),
                Err(e) => {
                    tracing::error!(job_id = %job_id, version_id = %version_id, error = %e, "job failed");
                    (JobStatus::Failed { reason: e.to_string() }, None)
                }
            };
            runner.finish(job_id, status, batches).await;
            runner.handles.lock().await.remove(&job_id);
        });
        handles.insert(job_id, handle);
        job_id
    }

    async fn finish(&self, job_id: Uuid, status: JobStatus, batches: Option<BatchReport>) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&job_id) {
            tracing::info!(job_id = %job_id, status = ?status, "job finished");
            job.status = status;
            job.batches = batches;
            job.finished_at = Some(Utc::now());
        }
    }
}

/// Drop finished records older than `retention`. Running jobs are kept.
fn prune_finished(jobs: &mut HashMap<Uuid, JobRecord>, retention: Duration) -> usize {
    let Ok(retention) = chrono::Duration::from_std(retention) else {
        return 0;
    };
    let cutoff = Utc::now() - retention;
    let before = jobs.len();
    jobs.retain(|_, job| job.finished_at.is_none_or(|at| at > cutoff));
    before - jobs.len()
}
