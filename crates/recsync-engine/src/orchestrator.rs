//! Sync orchestrator: runs transform, dispatch, extraction and
//! reconciliation for each record type in dependency order.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use recsync_state::StatusBackend;
use recsync_store::{SheetBinding, SourceStore};
use recsync_types::job::{JobCounts, JobStatus, Operation};
use recsync_types::outcome::OutcomeRecord;
use recsync_types::progress::{ProgressPhase, ProgressSnapshot};
use recsync_types::record::{clean_field_name, RecordType};
use recsync_types::status::{RunStats, SyncState, SyncStatus};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::archive::{failure_records, persist_failures};
use crate::classify::{classify, group_failures, recommend, ClassifiedFailure};
use crate::config::types::DispatchConfig;
use crate::dispatch::{BulkApi, Dispatched, Dispatcher};
use crate::error::SyncError;
use crate::extract::{extract, Extraction};
use crate::fingerprint::fingerprint;
use crate::reconcile::{reconcile, Reconciliation};
use crate::registry::{RecordTypeSpec, Registry, RegistryError};
use crate::report::{PullOutcome, PullReport, SyncReport, TypeOutcome, TypeStatus};
use crate::transform::transform_batch;

/// Dispatcher timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub poll_interval: Duration,
    /// Upper bound on waiting for one job.
    pub timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(600),
        }
    }
}

impl EngineOptions {
    #[must_use]
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Which record types to sync, and per-run operation overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    /// Empty means every registered type.
    pub record_types: Vec<String>,
    pub operations: BTreeMap<String, Operation>,
}

impl RunRequest {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_types.push(record_type.into());
        self
    }

    #[must_use]
    pub fn with_operation(mut self, record_type: impl Into<String>, operation: Operation) -> Self {
        self.operations.insert(record_type.into(), operation);
        self
    }
}

/// A background orchestration: progress snapshots plus the final report.
pub struct SyncHandle {
    pub progress: watch::Receiver<ProgressSnapshot>,
    pub join: JoinHandle<Result<SyncReport, SyncError>>,
}

/// Identifier-aware bulk sync engine.
pub struct SyncEngine {
    dispatcher: Dispatcher,
    store: Arc<dyn SourceStore>,
    status: Arc<dyn StatusBackend>,
    registry: Arc<Registry>,
}

fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn join_error(what: &str, e: &tokio::task::JoinError) -> SyncError {
    SyncError::Infrastructure(anyhow::anyhow!("{what} task panicked: {e}"))
}

/// Remote fields to query for a sheet: cleaned headers that look like field
/// names, minus the identifier column and never-transmit fields.
fn pull_fields(spec: &RecordTypeSpec, columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .map(|c| clean_field_name(c))
        .filter(|f| {
            !f.is_empty()
                && *f != spec.identifier_column
                && f != "Id"
                && !spec.never_transmit.contains(f)
                && f.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        })
        .collect()
}

impl SyncEngine {
    #[must_use]
    pub fn new(
        api: Arc<dyn BulkApi>,
        store: Arc<dyn SourceStore>,
        status: Arc<dyn StatusBackend>,
        registry: Arc<Registry>,
        options: EngineOptions,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(api, options.poll_interval, options.timeout),
            store,
            status,
            registry,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Launch [`run`](Self::run) as a detached task.
    ///
    /// Dropping the handle does not stop the run, and a job already
    /// submitted is never aborted remotely.
    #[must_use]
    pub fn spawn(self: Arc<Self>, request: RunRequest) -> SyncHandle {
        let total = self
            .registry
            .select(&request.record_types)
            .map_or(0, |specs| specs.len());
        let (tx, rx) = watch::channel(ProgressSnapshot::initializing(total));
        let join = tokio::spawn(async move { self.run(&request, &tx).await });
        SyncHandle { progress: rx, join }
    }

    /// Sync the requested record types one at a time, in dependency order.
    ///
    /// A record type that fails does not stop the run.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] for an invalid request or when the status
    /// backend fails.
    ///
    /// A run that aborts still publishes a final `Completed` snapshot whose
    /// message names the error.
    pub async fn run(
        &self,
        request: &RunRequest,
        progress: &watch::Sender<ProgressSnapshot>,
    ) -> Result<SyncReport, SyncError> {
        let result = self.run_types(request, progress).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "Sync run aborted");
            progress.send_modify(|snapshot| {
                snapshot.status = ProgressPhase::Completed;
                snapshot.current_type = None;
                snapshot.message = format!("Sync failed: {e}");
            });
        }
        result
    }

    async fn run_types(
        &self,
        request: &RunRequest,
        progress: &watch::Sender<ProgressSnapshot>,
    ) -> Result<SyncReport, SyncError> {
        let specs = self.registry.select(&request.record_types)?;
        for name in request.operations.keys() {
            if self.registry.get(&RecordType::new(name.as_str())).is_none() {
                return Err(RegistryError::UnknownRecordType(name.clone()).into());
            }
        }

        let started_at = now_iso8601();
        let start = Instant::now();
        let total = specs.len();
        tracing::info!(record_types = total, "Sync run started");

        let mut outcomes = Vec::with_capacity(total);
        for (i, spec) in specs.into_iter().enumerate() {
            let operation = request
                .operations
                .get(spec.record_type.as_str())
                .copied()
                .unwrap_or(spec.operation);

            progress.send_replace(ProgressSnapshot {
                status: ProgressPhase::Syncing,
                current_type: Some(spec.record_type.to_string()),
                completed: i,
                total,
                message: format!("Syncing {} ({}/{total})", spec.record_type, i + 1),
            });

            let outcome = self.sync_type(spec, operation).await?;
            progress.send_replace(ProgressSnapshot {
                status: ProgressPhase::Syncing,
                current_type: Some(spec.record_type.to_string()),
                completed: i + 1,
                total,
                message: format!("{}: {}", spec.record_type, outcome.status),
            });
            outcomes.push(outcome);
        }

        let report = SyncReport::new(started_at, now_iso8601(), outcomes);
        tracing::info!(
            synced = report.totals.synced,
            partially_synced = report.totals.partially_synced,
            failed = report.totals.failed,
            timed_out = report.totals.timed_out,
            skipped = report.totals.skipped,
            duration_secs = start.elapsed().as_secs_f64(),
            "Sync run completed"
        );
        progress.send_replace(ProgressSnapshot {
            status: ProgressPhase::Completed,
            current_type: None,
            completed: total,
            total,
            message: format!("Sync completed: {}", report.summary_line()),
        });
        Ok(report)
    }

    /// Compare each synced type's source rows with the fingerprint stored
    /// after its last run, marking changed types `Modified`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the status backend fails. Unreadable
    /// sheets are skipped.
    pub async fn detect_changes(&self) -> Result<Vec<RecordType>, SyncError> {
        let mut modified = Vec::new();
        for spec in self.registry.iter() {
            let rt = spec.record_type.clone();
            let status = self.with_status("get_status", move |s| s.get_status(&rt)).await?;
            let Some(stored) = status.fingerprint else {
                continue;
            };
            if !matches!(status.state, SyncState::Synced | SyncState::PartiallySynced) {
                continue;
            }

            let binding = spec.binding();
            let batch = match self.with_store("read", move |s| s.read(&binding)).await {
                Ok(batch) => batch,
                Err(e) if !e.is_fatal() => {
                    tracing::warn!(
                        record_type = spec.record_type.as_str(),
                        error = %e,
                        "Skipping change detection"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };
            if fingerprint(&batch) == stored {
                continue;
            }

            let rt = spec.record_type.clone();
            if self.with_status("mark_modified", move |s| s.mark_modified(&rt)).await? {
                tracing::info!(record_type = spec.record_type.as_str(), "Source rows changed");
                modified.push(spec.record_type.clone());
            }
        }
        Ok(modified)
    }

    /// Refresh the requested types' sheets from the remote system, in
    /// dependency order. Each sheet keeps its header and gets its identifier
    /// column filled from the remote ids; its status becomes `Synced` with
    /// the new row count. A type whose query or refresh fails is reported
    /// and leaves its sheet and status untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] for an unknown record type or when the status
    /// backend fails.
    pub async fn pull(&self, record_types: &[String]) -> Result<PullReport, SyncError> {
        let specs = self.registry.select(record_types)?;
        let started_at = now_iso8601();
        tracing::info!(record_types = specs.len(), "Pull started");

        let mut outcomes = Vec::with_capacity(specs.len());
        for spec in specs {
            let outcome = match self.pull_type(spec).await {
                Ok(records) => PullOutcome::pulled(spec.record_type.as_str(), records),
                Err(e) if !e.is_fatal() => {
                    tracing::error!(
                        record_type = spec.record_type.as_str(),
                        error = %e,
                        "Record type pull failed"
                    );
                    PullOutcome::failed(spec.record_type.as_str(), e.to_string())
                }
                Err(e) => return Err(e),
            };
            outcomes.push(outcome);
        }

        let report = PullReport {
            started_at,
            finished_at: now_iso8601(),
            outcomes,
        };
        tracing::info!(summary = report.summary_line().as_str(), "Pull completed");
        Ok(report)
    }

    async fn pull_type(&self, spec: &RecordTypeSpec) -> Result<u64, SyncError> {
        let binding = spec.binding();
        let current = self
            .with_store("read", move |s| s.read(&binding))
            .await?;
        let fields = pull_fields(spec, &current.columns);

        let mut pulled = self
            .dispatcher
            .api()
            .query(&spec.record_type, &fields)
            .await?;
        if let Some(idx) = pulled.column_index("Id") {
            pulled.header[idx].clone_from(&spec.identifier_column);
        }

        let binding = spec.binding();
        let column = spec.identifier_column.clone();
        let rows = self
            .with_store("replace_rows", move |s| {
                s.replace_rows(&binding, &pulled, &column)
            })
            .await?;
        let binding = spec.binding();
        let refreshed = self
            .with_store("read", move |s| s.read(&binding))
            .await?;

        let records = rows as u64;
        let rt = spec.record_type.clone();
        let prior = self.with_status("get_status", move |s| s.get_status(&rt)).await?;
        let next = SyncStatus {
            state: SyncState::Synced,
            last_sync: Some(now_iso8601()),
            record_count: records,
            message: Some(format!("Pulled {records} records")),
            fingerprint: Some(fingerprint(&refreshed)),
            ..prior
        };
        self.with_status("put_status", move |s| s.put_status(&next))
            .await?;

        tracing::info!(
            record_type = spec.record_type.as_str(),
            records,
            "Record type pulled"
        );
        Ok(records)
    }

    async fn sync_type(
        &self,
        spec: &RecordTypeSpec,
        operation: Operation,
    ) -> Result<TypeOutcome, SyncError> {
        let rt = spec.record_type.clone();
        let prior = self.with_status("get_status", move |s| s.get_status(&rt)).await?;
        if prior.state == SyncState::Syncing {
            tracing::warn!(
                record_type = spec.record_type.as_str(),
                "Previous sync of this record type did not finish"
            );
        }

        let syncing = SyncStatus {
            state: SyncState::Syncing,
            ..prior.clone()
        };
        self.with_status("put_status", move |s| s.put_status(&syncing))
            .await?;
        let rt = spec.record_type.clone();
        let run_id = self
            .with_status("start_run", move |s| s.start_run(&rt, operation))
            .await?;

        tracing::info!(
            record_type = spec.record_type.as_str(),
            %operation,
            run_id,
            "Syncing record type"
        );

        let mut outcome = TypeOutcome::new(spec.record_type.as_str(), operation);
        let mut failures = Vec::new();
        let fingerprint = match self.attempt(spec, operation, &mut outcome, &mut failures).await {
            Ok(fingerprint) => fingerprint,
            Err(e) if !e.is_fatal() => {
                tracing::error!(
                    record_type = spec.record_type.as_str(),
                    error = %e,
                    "Record type sync failed"
                );
                outcome.status = TypeStatus::Failed;
                outcome.message = Some(e.to_string());
                None
            }
            Err(e) => return Err(e),
        };

        outcome.failure_groups = group_failures(&failures);
        outcome.recommendations = recommend(&outcome.failure_groups, &spec.record_type);

        self.finish(spec, run_id, prior, &outcome, fingerprint, &failures)
            .await?;
        Ok(outcome)
    }

    /// Transform, dispatch, extract and reconcile one type. Returns the
    /// fingerprint of the source rows after write-back.
    async fn attempt(
        &self,
        spec: &RecordTypeSpec,
        operation: Operation,
        outcome: &mut TypeOutcome,
        failures: &mut Vec<ClassifiedFailure>,
    ) -> Result<Option<String>, SyncError> {
        let binding = spec.binding();
        let read_binding = binding.clone();
        let source = self
            .with_store("read", move |s| s.read(&read_binding))
            .await?;
        outcome.records_read = source.len() as u64;

        let transformed = transform_batch(&source, spec, operation);
        outcome.blank_rows = transformed.blank_rows as u64;
        outcome.invalid = transformed.invalid.len() as u64;
        failures.extend(transformed.invalid.into_iter().map(|record| {
            let classification =
                classify(record.raw_error.as_deref().unwrap_or_default(), &spec.record_type);
            ClassifiedFailure {
                outcome: record,
                classification,
            }
        }));

        let batch = transformed.batch;
        if batch.is_empty() {
            if outcome.invalid > 0 {
                outcome.status = TypeStatus::Failed;
                outcome.message = Some(format!(
                    "All {} record(s) were rejected before sending",
                    outcome.invalid
                ));
            } else {
                outcome.status = TypeStatus::Skipped;
                outcome.message = Some("No records to sync".to_string());
                tracing::info!(record_type = spec.record_type.as_str(), "Nothing to sync");
            }
            return Ok(None);
        }

        let dispatched = self
            .dispatcher
            .dispatch(&batch, operation, spec.upsert_key(operation))
            .await?;
        let (job, recovered) = match dispatched {
            Dispatched::Finished { job, recovered } => (job, recovered),
            Dispatched::Rejected(message) => {
                outcome.status = TypeStatus::Failed;
                outcome.message = Some(message);
                return Ok(None);
            }
        };

        outcome.job_id = Some(job.id.clone());
        outcome.processed = job.counts.processed;
        outcome.failed = job.counts.failed;
        outcome.succeeded = job.counts.succeeded();

        match job.status {
            JobStatus::TimedOut => {
                outcome.status = TypeStatus::TimedOut;
                outcome.message = Some(format!("Job {} did not finish in time", job.id));
                return Ok(None);
            }
            JobStatus::Failed if job.counts.processed == 0 => {
                outcome.status = TypeStatus::Failed;
                outcome.message = Some(format!("Job {} failed remotely", job.id));
                return Ok(None);
            }
            JobStatus::Failed => {
                // Records the remote side processed before failing are kept
                // there, so their identifiers still need writing back.
                tracing::warn!(
                    record_type = spec.record_type.as_str(),
                    job_id = job.id.as_str(),
                    processed = job.counts.processed,
                    failed = job.counts.failed,
                    "Job failed remotely after processing records"
                );
            }
            _ => {}
        }
        let unprocessed = if job.status == JobStatus::Failed {
            (batch.len() as u64).saturating_sub(job.counts.processed)
        } else {
            0
        };

        let extraction = if job.counts.processed > 0 || recovered {
            let results = self
                .dispatcher
                .api()
                .fetch_results(&job.id, &batch.natural_key)
                .await?;
            extract(&results, &batch)
        } else {
            Extraction::default()
        };
        outcome.duplicates = extraction.duplicates.len() as u64;

        let remote_failed = job
            .counts
            .failed
            .saturating_sub(outcome.duplicates)
            .max(extraction.failed.len() as u64);
        // Whole-type view: duplicates count as settled, unprocessed and
        // pre-dispatch rejections as failed.
        let settled = JobCounts {
            processed: job.counts.processed + unprocessed + outcome.invalid,
            failed: remote_failed + unprocessed + outcome.invalid,
            created: job.counts.created,
        };

        let reconcilable: Vec<OutcomeRecord> = extraction.reconcilable().cloned().collect();
        failures.extend(extraction.duplicates);
        failures.extend(extraction.failed);

        let reconciliation = self.write_back(spec, &binding, reconcilable).await?;
        outcome.identifiers_reconciled = reconciliation.reconciled as u64;
        outcome.unmatched = reconciliation.unmatched.len() as u64;

        outcome.status = if settled.failed == 0 {
            TypeStatus::Synced
        } else if settled.is_partial_success() {
            TypeStatus::PartiallySynced
        } else {
            TypeStatus::Failed
        };
        outcome.message = Some(if job.status == JobStatus::Failed {
            format!(
                "Job {} failed remotely: {} succeeded, {} failed, {} not processed",
                job.id,
                outcome.succeeded,
                outcome.total_failed(),
                unprocessed
            )
        } else {
            format!(
                "{} succeeded, {} failed",
                outcome.succeeded,
                outcome.total_failed()
            )
        });

        let fingerprint_binding = binding.clone();
        let fingerprint = match self
            .with_store("read", move |s| s.read(&fingerprint_binding))
            .await
        {
            Ok(batch) => Some(fingerprint(&batch)),
            Err(e) => {
                tracing::warn!(
                    record_type = spec.record_type.as_str(),
                    error = %e,
                    "Could not fingerprint source rows"
                );
                None
            }
        };
        Ok(fingerprint)
    }

    async fn write_back(
        &self,
        spec: &RecordTypeSpec,
        binding: &SheetBinding,
        outcomes: Vec<OutcomeRecord>,
    ) -> Result<Reconciliation, SyncError> {
        if outcomes.is_empty() {
            return Ok(Reconciliation::default());
        }
        let binding = binding.clone();
        let column = spec.identifier_column.clone();
        self.with_store("reconcile", move |s| {
            reconcile(s, &binding, &column, &outcomes)
        })
        .await
    }

    /// Persist status, run history and the failure archive.
    async fn finish(
        &self,
        spec: &RecordTypeSpec,
        run_id: i64,
        prior: SyncStatus,
        outcome: &TypeOutcome,
        fingerprint: Option<String>,
        failures: &[ClassifiedFailure],
    ) -> Result<(), SyncError> {
        let finished_at = now_iso8601();
        let next = match outcome.status.sync_state() {
            Some(state) => {
                let synced = matches!(state, SyncState::Synced | SyncState::PartiallySynced);
                SyncStatus {
                    record_type: spec.record_type.to_string(),
                    state,
                    last_sync: if synced {
                        Some(finished_at.clone())
                    } else {
                        prior.last_sync.clone()
                    },
                    record_count: outcome.records_read,
                    records_processed: outcome.processed,
                    records_failed: outcome.total_failed(),
                    message: outcome.message.clone(),
                    fingerprint: fingerprint.or(prior.fingerprint),
                }
            }
            None => prior,
        };
        self.with_status("put_status", move |s| s.put_status(&next))
            .await?;

        let failed_outcome = matches!(
            outcome.status,
            TypeStatus::Failed | TypeStatus::TimedOut
        );
        let stats = RunStats {
            records_read: outcome.records_read,
            records_processed: outcome.processed,
            records_failed: outcome.total_failed(),
            identifiers_written: outcome.identifiers_reconciled,
            job_id: outcome.job_id.clone(),
            error_message: if failed_outcome {
                outcome.message.clone()
            } else {
                None
            },
        };
        let run_status = outcome.status.run_status();
        self.with_status("complete_run", move |s| {
            s.complete_run(run_id, run_status, &stats)
        })
        .await?;

        let records = failure_records(&spec.record_type, failures, &finished_at);
        let status = Arc::clone(&self.status);
        let rt = spec.record_type.clone();
        tokio::task::spawn_blocking(move || {
            persist_failures(status.as_ref(), &rt, run_id, &records);
        })
        .await
        .map_err(|e| join_error("persist_failures", &e))?;

        tracing::info!(
            record_type = spec.record_type.as_str(),
            status = %outcome.status,
            processed = outcome.processed,
            failed = outcome.total_failed(),
            reconciled = outcome.identifiers_reconciled,
            "Record type finished"
        );
        Ok(())
    }

    async fn with_status<T, F>(&self, what: &'static str, f: F) -> Result<T, SyncError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn StatusBackend) -> recsync_state::error::Result<T> + Send + 'static,
    {
        let status = Arc::clone(&self.status);
        tokio::task::spawn_blocking(move || f(status.as_ref()))
            .await
            .map_err(|e| join_error(what, &e))?
            .map_err(SyncError::State)
    }

    async fn with_store<T, F>(&self, what: &'static str, f: F) -> Result<T, SyncError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn SourceStore) -> recsync_store::error::Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| join_error(what, &e))?
            .map_err(SyncError::Store)
    }
}
