//! One-shot job submission and tracking.
//!
//! A job moves `pending → running → succeeded | failed`. Once terminal its
//! record never changes and it is never re-executed.

use std::sync::Arc;
use std::time::SystemTime;

use indexmap::IndexMap;
use parking_lot::RwLock;
use praetor_executors::PolicyExecutor;
use praetor_policy::{JsonMap, Overrides, PolicyRuleUri};
use praetor_system::resource::GlobalResource;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::error::{DispatchError, ErrorReport};
use crate::platform::{JobSpec, OrchestrationPlatform};

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Submitted, not started.
    Pending,
    /// Started on the platform.
    Running,
    /// Finished with a result.
    Succeeded,
    /// Finished with an error.
    Failed,
}

impl JobStatus {
    /// Returns `true` for `succeeded` and `failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// What a caller gets back from a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    /// Id to query the job by.
    pub job_id: String,
    /// Executor the job was scheduled on.
    pub executor_id: String,
}

/// The record of one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    /// Job id.
    pub job_id: String,
    /// Executor the job runs on.
    pub executor_id: String,
    /// Rule being evaluated.
    pub policy_rule_uri: PolicyRuleUri,
    /// Parameters override sent with the job.
    pub parameters: JsonMap,
    /// Evaluation input.
    pub inputs: Value,
    /// Current state.
    pub status: JobStatus,
    /// Output, once succeeded.
    pub result: Option<Value>,
    /// Error, once failed.
    pub error: Option<ErrorReport>,
    /// Submission time.
    pub submitted_at: SystemTime,
    /// Time the job became terminal.
    pub finished_at: Option<SystemTime>,
}

#[derive(Debug, Default)]
struct JobBook {
    jobs: RwLock<IndexMap<String, Job>>,
    finished: Notify,
}

impl JobBook {
    fn transition(&self, job_id: &str, apply: impl FnOnce(&mut Job)) {
        let mut jobs = self.jobs.write();
        let Some(job) = jobs.get_mut(job_id) else {
            return;
        };
        if job.status.is_terminal() {
            warn!(job_id, "ignoring update to finished job");
            return;
        }
        apply(job);
        if job.status.is_terminal() {
            job.finished_at = Some(SystemTime::now());
            info!(job_id, status = ?job.status, "job finished");
            drop(jobs);
            self.finished.notify_waiters();
        }
    }
}

/// Reports progress of one job back to its [`JobManager`].
///
/// Handed to the platform with each submission. Updates after the job became
/// terminal are ignored.
#[derive(Debug, Clone)]
pub struct JobReporter {
    job_id: String,
    book: Arc<JobBook>,
}

impl JobReporter {
    /// The job being reported on.
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Marks the job running.
    pub fn running(&self) {
        self.book.transition(&self.job_id, |job| {
            job.status = JobStatus::Running;
        });
    }

    /// Marks the job succeeded with `result`.
    pub fn succeeded(&self, result: Value) {
        self.book.transition(&self.job_id, |job| {
            job.status = JobStatus::Succeeded;
            job.result = Some(result);
        });
    }

    /// Marks the job failed.
    pub fn failed(&self, error: ErrorReport) {
        self.book.transition(&self.job_id, |job| {
            job.status = JobStatus::Failed;
            job.error = Some(error);
        });
    }
}

/// Submits jobs to the platform and keeps their records.
pub struct JobManager {
    platform: Arc<dyn OrchestrationPlatform>,
    book: Arc<JobBook>,
}

impl GlobalResource for JobManager {}

impl core::fmt::Debug for JobManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JobManager")
            .field("jobs", &self.book.jobs.read().len())
            .finish_non_exhaustive()
    }
}

impl JobManager {
    /// Creates a manager submitting to `platform`.
    #[must_use]
    pub fn new(platform: Arc<dyn OrchestrationPlatform>) -> Self {
        Self {
            platform,
            book: Arc::new(JobBook::default()),
        }
    }

    /// Submits a job and returns without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns the platform's error if it refuses the job; the record is then
    /// marked failed.
    pub async fn submit_job(
        &self,
        executor: &PolicyExecutor,
        policy_rule_uri: &PolicyRuleUri,
        overrides: Overrides,
        inputs: Value,
    ) -> Result<JobHandle, DispatchError> {
        let job_id = nanoid::nanoid!();
        let job = Job {
            job_id: job_id.clone(),
            executor_id: executor.executor_id.clone(),
            policy_rule_uri: policy_rule_uri.clone(),
            parameters: overrides.parameters.clone().unwrap_or_default(),
            inputs: inputs.clone(),
            status: JobStatus::Pending,
            result: None,
            error: None,
            submitted_at: SystemTime::now(),
            finished_at: None,
        };
        self.book.jobs.write().insert(job_id.clone(), job);

        let reporter = JobReporter {
            job_id: job_id.clone(),
            book: Arc::clone(&self.book),
        };
        let spec = JobSpec {
            job_id: job_id.clone(),
            executor: executor.clone(),
            policy_rule_uri: policy_rule_uri.clone(),
            overrides,
            inputs,
        };

        if let Err(err) = self.platform.submit_job(spec, reporter.clone()).await {
            reporter.failed(err.report());
            return Err(err);
        }

        info!(job_id = %job_id, executor_id = %executor.executor_id, policy_rule_uri = %policy_rule_uri, "job submitted");
        Ok(JobHandle {
            job_id,
            executor_id: executor.executor_id.clone(),
        })
    }

    /// Returns a job's record.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotFound`] for an unknown id.
    pub fn get_job(&self, job_id: &str) -> Result<Job, DispatchError> {
        self.book
            .jobs
            .read()
            .get(job_id)
            .cloned()
            .ok_or_else(|| DispatchError::not_found("job", job_id))
    }

    /// Every job, in submission order.
    #[must_use]
    pub fn list_jobs(&self) -> Vec<Job> {
        self.book.jobs.read().values().cloned().collect()
    }

    /// Waits until the job is terminal and returns its record.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotFound`] for an unknown id.
    pub async fn wait(&self, job_id: &str) -> Result<Job, DispatchError> {
        loop {
            let finished = self.book.finished.notified();
            let job = self.get_job(job_id)?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            finished.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book_with(job_id: &str) -> Arc<JobBook> {
        let book = Arc::new(JobBook::default());
        book.jobs.write().insert(
            job_id.to_string(),
            Job {
                job_id: job_id.to_string(),
                executor_id: "executor-001".into(),
                policy_rule_uri: "ip-allowlist:1.0-stable".parse().unwrap(),
                parameters: JsonMap::new(),
                inputs: Value::Null,
                status: JobStatus::Pending,
                result: None,
                error: None,
                submitted_at: SystemTime::now(),
                finished_at: None,
            },
        );
        book
    }

    #[test]
    fn terminal_records_are_immutable() {
        let book = book_with("job-1");
        let reporter = JobReporter {
            job_id: "job-1".into(),
            book: Arc::clone(&book),
        };

        reporter.running();
        reporter.succeeded(serde_json::json!({"allowed": true}));
        reporter.failed(ErrorReport {
            kind: crate::error::ErrorKind::Execution,
            detail: "late".into(),
        });
        reporter.running();

        let job = book.jobs.read().get("job-1").cloned().unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.result, Some(serde_json::json!({"allowed": true})));
        assert!(job.error.is_none());
        assert!(job.finished_at.is_some());
    }
}
