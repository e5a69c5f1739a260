//! Bulk operation dispatch: submit one record set as a job and wait, bounded
//! by a timeout, for it to reach a terminal status. Also the bulk query used
//! to pull remote records back into the source store.

pub mod error;
pub mod sf_cli;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use recsync_types::job::{JobCounts, JobStatus, Operation, SyncJob};
use recsync_store::Sheet;
use recsync_types::record::{RecordBatch, RecordType};

pub use error::DispatchError;
pub use sf_cli::SfCliBulkApi;

/// Immediate response to a job submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The job was created and can be polled.
    Accepted(SyncJob),
    /// The tool reported an error, but the payload names a job whose
    /// per-record results are already available.
    RecoveredPartial { job: SyncJob, failed_hint: u64 },
    /// The submission was refused outright.
    Rejected(String),
}

/// One poll observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobPoll {
    pub status: JobStatus,
    pub counts: JobCounts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SucceededRow {
    pub natural_key: Option<String>,
    pub id: String,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRow {
    pub natural_key: Option<String>,
    pub error: String,
}

/// Per-record results of a finished job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobResults {
    pub succeeded: Vec<SucceededRow>,
    pub failed: Vec<FailedRow>,
}

/// Job-based bulk API of the remote record system.
#[async_trait]
pub trait BulkApi: Send + Sync {
    /// Submit `batch` as one job.
    async fn submit(
        &self,
        batch: &RecordBatch,
        operation: Operation,
        external_id: Option<&str>,
    ) -> Result<SubmitOutcome, DispatchError>;

    /// Current status and counts of a job.
    async fn poll(&self, job_id: &str) -> Result<JobPoll, DispatchError>;

    /// Per-record results. `natural_key` names the column used to match
    /// result rows back to source rows.
    async fn fetch_results(
        &self,
        job_id: &str,
        natural_key: &str,
    ) -> Result<JobResults, DispatchError>;

    /// Every remote record of `record_type`, one column per entry of
    /// `fields`. The result always carries an `Id` column.
    async fn query(
        &self,
        record_type: &RecordType,
        fields: &[String],
    ) -> Result<Sheet, DispatchError>;
}

/// Result of [`Dispatcher::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// The job reached a terminal status (including `TimedOut`).
    Finished { job: SyncJob, recovered: bool },
    Rejected(String),
}

/// Submits a batch and polls it to completion.
#[derive(Clone)]
pub struct Dispatcher {
    api: Arc<dyn BulkApi>,
    poll_interval: Duration,
    timeout: Duration,
}

impl Dispatcher {
    #[must_use]
    pub fn new(api: Arc<dyn BulkApi>, poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            api,
            poll_interval,
            timeout,
        }
    }

    #[must_use]
    pub fn api(&self) -> &Arc<dyn BulkApi> {
        &self.api
    }

    /// Submit `batch` and wait for a terminal status.
    ///
    /// A job still running when the timeout elapses is returned with
    /// [`JobStatus::TimedOut`]; it is never resubmitted.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when a tool invocation fails.
    pub async fn dispatch(
        &self,
        batch: &RecordBatch,
        operation: Operation,
        external_id: Option<&str>,
    ) -> Result<Dispatched, DispatchError> {
        let (mut job, failed_hint) = match self.api.submit(batch, operation, external_id).await? {
            SubmitOutcome::Accepted(job) => (job, None),
            SubmitOutcome::RecoveredPartial { job, failed_hint } => {
                tracing::warn!(
                    record_type = batch.record_type.as_str(),
                    job_id = job.id.as_str(),
                    failed_hint,
                    "Bulk tool reported failed records, recovering job results"
                );
                (job, Some(failed_hint))
            }
            SubmitOutcome::Rejected(message) => {
                tracing::error!(
                    record_type = batch.record_type.as_str(),
                    error = message.as_str(),
                    "Bulk submission rejected"
                );
                return Ok(Dispatched::Rejected(message));
            }
        };

        tracing::info!(
            record_type = batch.record_type.as_str(),
            job_id = job.id.as_str(),
            %operation,
            records = batch.len(),
            "Bulk job submitted"
        );

        let waited = tokio::time::timeout(self.timeout, self.wait(&mut job)).await;
        match waited {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    record_type = batch.record_type.as_str(),
                    job_id = job.id.as_str(),
                    timeout_secs = self.timeout.as_secs(),
                    "Bulk job did not finish in time"
                );
                job.status = JobStatus::TimedOut;
            }
        }

        if let Some(hint) = failed_hint {
            job.counts.failed = job.counts.failed.max(hint);
            job.counts.processed = job.counts.processed.max(job.counts.failed);
        }

        Ok(Dispatched::Finished {
            job,
            recovered: failed_hint.is_some(),
        })
    }

    async fn wait(&self, job: &mut SyncJob) -> Result<(), DispatchError> {
        loop {
            let poll = self.api.poll(&job.id).await?;
            tracing::debug!(
                job_id = job.id.as_str(),
                status = %poll.status,
                processed = poll.counts.processed,
                failed = poll.counts.failed,
                "Polled bulk job"
            );
            if job.observe(poll.status, poll.counts) {
                return Ok(());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
