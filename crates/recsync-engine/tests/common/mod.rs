//! Shared fixtures for engine integration tests: an in-process stand-in for
//! the remote bulk API plus helpers to build engines over in-memory stores.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use recsync_engine::dispatch::{
    FailedRow, JobPoll, JobResults, SubmitOutcome, SucceededRow,
};
use recsync_engine::{BulkApi, DispatchError, EngineOptions, Registry, SyncEngine};
use recsync_state::SqliteStatusBackend;
use recsync_store::{MemorySourceStore, Sheet};
use recsync_types::job::{JobCounts, JobStatus, Operation, SyncJob};
use recsync_types::record::{Record, RecordBatch, RecordType};

/// A submission as the fake saw it.
#[derive(Debug, Clone)]
pub struct Submission {
    pub record_type: String,
    pub operation: Operation,
    pub external_id: Option<String>,
    pub rows: usize,
    /// Field names present on the first record sent.
    pub fields: Vec<String>,
    pub records: Vec<Record>,
}

struct FakeJob {
    counts: JobCounts,
    results: JobResults,
    hang: bool,
    aborted: bool,
}

#[derive(Default)]
struct FakeState {
    /// Record type -> natural key -> remote id.
    remote: HashMap<String, HashMap<String, String>>,
    /// Record type -> remote id -> field values last written.
    values: HashMap<String, HashMap<String, BTreeMap<String, String>>>,
    /// Record type and field list of every query.
    queries: Vec<(String, Vec<String>)>,
    jobs: HashMap<String, FakeJob>,
    submissions: Vec<Submission>,
    next_id: u64,
}

/// In-memory bulk API that keys remote records by natural key.
///
/// Inserts of a key that already exists fail with a duplicate error naming
/// the existing id; upserts update in place.
#[derive(Default)]
pub struct FakeBulkApi {
    state: Mutex<FakeState>,
    required: HashMap<String, Vec<String>>,
    hang: HashSet<String>,
    reject: HashMap<String, String>,
    abort_after: HashMap<String, usize>,
}

impl FakeBulkApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records of `record_type` missing `field` fail remotely.
    pub fn require(mut self, record_type: &str, field: &str) -> Self {
        self.required
            .entry(record_type.to_string())
            .or_default()
            .push(field.to_string());
        self
    }

    /// Jobs for `record_type` never leave `Running`.
    pub fn hang(mut self, record_type: &str) -> Self {
        self.hang.insert(record_type.to_string());
        self
    }

    /// Submissions and queries for `record_type` are refused with `message`.
    pub fn reject(mut self, record_type: &str, message: &str) -> Self {
        self.reject
            .insert(record_type.to_string(), message.to_string());
        self
    }

    /// Jobs for `record_type` end `Failed` after processing `processed`
    /// records; the ones already processed stay applied remotely.
    pub fn abort_after(mut self, record_type: &str, processed: usize) -> Self {
        self.abort_after.insert(record_type.to_string(), processed);
        self
    }

    /// Pre-populate a remote record keyed by `Name`.
    pub fn seed(self, record_type: &str, natural_key: &str, id: &str) -> Self {
        self.seed_record(record_type, natural_key, id, &[])
    }

    /// Pre-populate a remote record with field values besides `Name`.
    pub fn seed_record(
        self,
        record_type: &str,
        natural_key: &str,
        id: &str,
        fields: &[(&str, &str)],
    ) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state
                .remote
                .entry(record_type.to_string())
                .or_default()
                .insert(natural_key.to_string(), id.to_string());
            let mut values: BTreeMap<String, String> = fields
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect();
            values.insert("Name".to_string(), natural_key.to_string());
            state
                .values
                .entry(record_type.to_string())
                .or_default()
                .insert(id.to_string(), values);
        }
        self
    }

    pub fn queries(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().unwrap().queries.clone()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn remote_id(&self, record_type: &str, natural_key: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .remote
            .get(record_type)
            .and_then(|m| m.get(natural_key).cloned())
    }

    pub fn remote_count(&self, record_type: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .remote
            .get(record_type)
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl BulkApi for FakeBulkApi {
    async fn submit(
        &self,
        batch: &RecordBatch,
        operation: Operation,
        external_id: Option<&str>,
    ) -> Result<SubmitOutcome, DispatchError> {
        let rt = batch.record_type.as_str().to_string();
        let mut state = self.state.lock().unwrap();
        state.submissions.push(Submission {
            record_type: rt.clone(),
            operation,
            external_id: external_id.map(str::to_string),
            rows: batch.len(),
            fields: batch
                .records
                .first()
                .map(|r| r.fields.keys().cloned().collect())
                .unwrap_or_default(),
            records: batch.records.clone(),
        });
        if let Some(message) = self.reject.get(&rt) {
            return Ok(SubmitOutcome::Rejected(message.clone()));
        }

        let required = self.required.get(&rt).cloned().unwrap_or_default();
        let mut counts = JobCounts::default();
        let mut results = JobResults::default();

        let limit = self.abort_after.get(&rt).copied();
        for record in batch.records.iter().take(limit.unwrap_or(usize::MAX)) {
            counts.processed += 1;
            let key = batch.natural_key_of(record).map(|k| k.trim().to_string());

            if operation == Operation::Insert && !record.get("Id").is_absent() {
                counts.failed += 1;
                results.failed.push(FailedRow {
                    natural_key: key,
                    error: "INVALID_FIELD_FOR_INSERT_UPDATE:Unable to create/update fields: Id:--"
                        .to_string(),
                });
                continue;
            }

            if let Some(missing) = required.iter().find(|f| record.get(f).is_absent()) {
                counts.failed += 1;
                results.failed.push(FailedRow {
                    natural_key: key,
                    error: format!(
                        "REQUIRED_FIELD_MISSING:Required fields are missing: [{missing}]:--"
                    ),
                });
                continue;
            }

            let Some(key) = key else {
                counts.failed += 1;
                results.failed.push(FailedRow {
                    natural_key: None,
                    error: "REQUIRED_FIELD_MISSING:Required fields are missing: [Name]:--"
                        .to_string(),
                });
                continue;
            };

            let values: BTreeMap<String, String> = record
                .fields
                .iter()
                .filter_map(|(k, v)| v.as_text().map(|t| (k.clone(), t.to_string())))
                .collect();
            let mut applied = None;

            state.next_id += 1;
            let fresh = format!("a0X{:012}", state.next_id);
            let remote = state.remote.entry(rt.clone()).or_default();
            match (operation, remote.get(&key).cloned()) {
                (Operation::Insert, Some(existing)) => {
                    counts.failed += 1;
                    results.failed.push(FailedRow {
                        natural_key: Some(key),
                        error: format!(
                            "DUPLICATE_VALUE:duplicate value found: Name duplicates value on record with id: {existing}:--"
                        ),
                    });
                }
                (Operation::Update, None) => {
                    counts.failed += 1;
                    results.failed.push(FailedRow {
                        natural_key: Some(key),
                        error: "ENTITY_IS_DELETED:entity is deleted:--".to_string(),
                    });
                }
                (_, Some(existing)) => {
                    applied = Some(existing.clone());
                    results.succeeded.push(SucceededRow {
                        natural_key: Some(key),
                        id: existing,
                        created: false,
                    });
                }
                (_, None) => {
                    remote.insert(key.clone(), fresh.clone());
                    counts.created += 1;
                    applied = Some(fresh.clone());
                    results.succeeded.push(SucceededRow {
                        natural_key: Some(key),
                        id: fresh,
                        created: true,
                    });
                }
            }
            if let Some(id) = applied {
                let stored = state.values.entry(rt.clone()).or_default().entry(id).or_default();
                stored.extend(values);
            }
        }

        let job_id = format!("750{:012}", state.jobs.len() + 1);
        state.jobs.insert(
            job_id.clone(),
            FakeJob {
                counts,
                results,
                hang: self.hang.contains(&rt),
                aborted: limit.is_some(),
            },
        );
        Ok(SubmitOutcome::Accepted(SyncJob::submitted(job_id, operation)))
    }

    async fn poll(&self, job_id: &str) -> Result<JobPoll, DispatchError> {
        let state = self.state.lock().unwrap();
        let job = state
            .jobs
            .get(job_id)
            .ok_or_else(|| DispatchError::MalformedResponse(format!("unknown job {job_id}")))?;
        if job.hang {
            return Ok(JobPoll {
                status: JobStatus::Running,
                counts: JobCounts::default(),
            });
        }
        let status = if job.aborted {
            JobStatus::Failed
        } else if job.counts.failed > 0 {
            JobStatus::CompletedWithErrors
        } else {
            JobStatus::Completed
        };
        Ok(JobPoll {
            status,
            counts: job.counts,
        })
    }

    async fn fetch_results(
        &self,
        job_id: &str,
        _natural_key: &str,
    ) -> Result<JobResults, DispatchError> {
        let state = self.state.lock().unwrap();
        state
            .jobs
            .get(job_id)
            .map(|job| job.results.clone())
            .ok_or_else(|| DispatchError::MalformedResponse(format!("unknown job {job_id}")))
    }

    async fn query(
        &self,
        record_type: &RecordType,
        fields: &[String],
    ) -> Result<Sheet, DispatchError> {
        let rt = record_type.as_str().to_string();
        let mut state = self.state.lock().unwrap();
        state.queries.push((rt.clone(), fields.to_vec()));
        if let Some(message) = self.reject.get(&rt) {
            return Err(DispatchError::CommandFailed(message.clone()));
        }

        let mut header = vec!["Id".to_string()];
        header.extend(fields.iter().filter(|f| *f != "Id").cloned());
        let mut sheet = Sheet::new(header.clone());
        let Some(records) = state.values.get(&rt) else {
            return Ok(sheet);
        };
        let mut ids: Vec<&String> = records.keys().collect();
        ids.sort();
        for id in ids {
            let values = &records[id];
            sheet = sheet.with_row(header.iter().map(|field| {
                if field == "Id" {
                    id.clone()
                } else {
                    values.get(field).cloned().unwrap_or_default()
                }
            }));
        }
        Ok(sheet)
    }
}

/// Fast polling with a short timeout.
pub fn test_options() -> EngineOptions {
    EngineOptions {
        poll_interval: Duration::from_millis(5),
        timeout: Duration::from_millis(150),
    }
}

pub struct Harness {
    pub api: Arc<FakeBulkApi>,
    pub store: Arc<MemorySourceStore>,
    pub status: Arc<SqliteStatusBackend>,
    pub engine: Arc<SyncEngine>,
}

pub fn harness(api: FakeBulkApi, store: MemorySourceStore, registry: Registry) -> Harness {
    let api = Arc::new(api);
    let store = Arc::new(store);
    let status = Arc::new(SqliteStatusBackend::in_memory().unwrap());
    let engine = Arc::new(SyncEngine::new(
        api.clone(),
        store.clone(),
        status.clone(),
        Arc::new(registry),
        test_options(),
    ));
    Harness {
        api,
        store,
        status,
        engine,
    }
}

/// A sheet with a `Name` column and the given extra columns.
pub fn sheet(columns: &[&str], rows: &[&[&str]]) -> Sheet {
    let mut sheet = Sheet::new(columns.iter().map(|c| (*c).to_string()).collect());
    for row in rows {
        sheet = sheet.with_row(row.iter().copied());
    }
    sheet
}

/// Identifier cell of the row whose `Name` is `name`.
pub fn identifier(store: &MemorySourceStore, sheet: &str, name: &str) -> Option<String> {
    let sheet = store.sheet(sheet).unwrap();
    let key = sheet.column_index("Name")?;
    let id = sheet.column_index("Id")?;
    sheet
        .rows
        .iter()
        .find(|row| row.get(key).map(String::as_str) == Some(name))
        .and_then(|row| row.get(id).cloned())
        .filter(|id| !id.is_empty())
}
