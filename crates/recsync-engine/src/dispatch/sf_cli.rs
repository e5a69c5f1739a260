//! [`BulkApi`] implementation driving the `sf` command-line tool.
//!
//! Every call spawns the tool as a subordinate process with `--json` output
//! and a per-call timeout. Submissions go in as CSV files under a work
//! directory; per-record results come back as the tool's
//! `<job>-success-records.csv` / `<job>-failed-records.csv` files. Queries
//! run as bulk queries with CSV written to stdout.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use recsync_types::csv;
use recsync_types::job::{JobCounts, JobStatus, Operation, SyncJob};
use recsync_store::Sheet;
use recsync_types::record::{clean_field_name, FieldValue, RecordBatch, RecordType};
use regex::Regex;
use serde_json::Value;
use tokio::process::Command;
use tokio::time::timeout;

use super::{BulkApi, DispatchError, FailedRow, JobPoll, JobResults, SubmitOutcome, SucceededRow};
use crate::config::types::ConnectionConfig;

const API_VERSION: &str = "v60.0";
const RECOVERABLE_ERROR: &str = "FailedRecordDetailsError";
const ID_COLUMN: &str = "sf__Id";
const CREATED_COLUMN: &str = "sf__Created";
const ERROR_COLUMN: &str = "sf__Error";
const REMOTE_ID: &str = "Id";

static JOB_ID_HINT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--job-id\s+([A-Za-z0-9]+)").expect("valid job id regex"));
static FAILED_COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)failed to process (\d+) records").expect("valid failed count regex")
});

/// Bulk API backed by the `sf` CLI.
#[derive(Debug, Clone)]
pub struct SfCliBulkApi {
    cli_command: String,
    target_org: String,
    command_timeout: Duration,
    work_dir: PathBuf,
}

struct CommandOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl SfCliBulkApi {
    #[must_use]
    pub fn new(
        cli_command: impl Into<String>,
        target_org: impl Into<String>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            cli_command: cli_command.into(),
            target_org: target_org.into(),
            command_timeout,
            work_dir: std::env::temp_dir().join("recsync"),
        }
    }

    #[must_use]
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(
            config.cli_command.clone(),
            config.target_org.clone(),
            Duration::from_secs(config.command_timeout_secs),
        )
    }

    /// Directory that holds submission and result files.
    #[must_use]
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    /// Confirm the tool can reach the target org. Returns the username the
    /// org alias resolves to.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the tool cannot be run or reports an
    /// error for the org.
    pub async fn check_org(&self) -> Result<String, DispatchError> {
        let args = vec![
            "org".to_string(),
            "display".to_string(),
            "--target-org".to_string(),
            self.target_org.clone(),
            "--json".to_string(),
        ];
        Self::ensure_dir(&self.work_dir).await?;
        let output = self.run(&args, &self.work_dir).await?;
        if !output.success {
            return Err(DispatchError::CommandFailed(failure_message(
                &output.stdout,
                &output.stderr,
            )));
        }
        parse_org_display(&output.stdout, &self.target_org)
    }

    async fn run(&self, args: &[String], cwd: &Path) -> Result<CommandOutput, DispatchError> {
        tracing::debug!(command = self.cli_command.as_str(), ?args, "Invoking bulk tool");

        let mut command = Command::new(&self.cli_command);
        command.args(args).current_dir(cwd).kill_on_drop(true);

        let output = timeout(self.command_timeout, command.output())
            .await
            .map_err(|_| DispatchError::CommandTimeout {
                secs: self.command_timeout.as_secs(),
            })?
            .map_err(|source| DispatchError::Spawn {
                command: self.cli_command.clone(),
                source,
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    async fn ensure_dir(dir: &Path) -> Result<(), DispatchError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| DispatchError::io(dir, e))
    }
}

#[async_trait]
impl BulkApi for SfCliBulkApi {
    async fn submit(
        &self,
        batch: &RecordBatch,
        operation: Operation,
        external_id: Option<&str>,
    ) -> Result<SubmitOutcome, DispatchError> {
        Self::ensure_dir(&self.work_dir).await?;
        let file = self.work_dir.join(format!(
            "{}-{}.csv",
            batch.record_type,
            chrono::Utc::now().format("%Y%m%dT%H%M%S%3f")
        ));
        tokio::fs::write(&file, render_batch_csv(batch))
            .await
            .map_err(|e| DispatchError::io(&file, e))?;

        let args = submit_args(
            batch.record_type.as_str(),
            operation,
            external_id,
            &file,
            &self.target_org,
        );
        let result = self.run(&args, &self.work_dir).await;

        if let Err(e) = tokio::fs::remove_file(&file).await {
            tracing::debug!(path = %file.display(), error = %e, "Could not remove submission file");
        }

        let output = result?;
        parse_submit_response(output.success, &output.stdout, &output.stderr, operation)
    }

    async fn poll(&self, job_id: &str) -> Result<JobPoll, DispatchError> {
        let args = vec![
            "api".to_string(),
            "request".to_string(),
            "rest".to_string(),
            format!("/services/data/{API_VERSION}/jobs/ingest/{job_id}"),
            "--target-org".to_string(),
            self.target_org.clone(),
        ];
        Self::ensure_dir(&self.work_dir).await?;
        let output = self.run(&args, &self.work_dir).await?;
        if !output.success {
            return Err(DispatchError::CommandFailed(failure_message(
                &output.stdout,
                &output.stderr,
            )));
        }
        parse_poll_response(&output.stdout)
    }

    async fn fetch_results(
        &self,
        job_id: &str,
        natural_key: &str,
    ) -> Result<JobResults, DispatchError> {
        let dir = self.work_dir.join(job_id);
        Self::ensure_dir(&dir).await?;

        let args = vec![
            "data".to_string(),
            "bulk".to_string(),
            "results".to_string(),
            "--job-id".to_string(),
            job_id.to_string(),
            "--target-org".to_string(),
            self.target_org.clone(),
            "--json".to_string(),
        ];
        let output = self.run(&args, &dir).await?;
        if !output.success {
            return Err(DispatchError::CommandFailed(failure_message(
                &output.stdout,
                &output.stderr,
            )));
        }

        let success_path = dir.join(format!("{job_id}-success-records.csv"));
        let failed_path = dir.join(format!("{job_id}-failed-records.csv"));

        let succeeded = match read_optional(&success_path).await? {
            Some(text) => parse_success_csv(&text, natural_key).map_err(|source| {
                DispatchError::Csv {
                    path: success_path.clone(),
                    source,
                }
            })?,
            None => Vec::new(),
        };
        let failed = match read_optional(&failed_path).await? {
            Some(text) => parse_failed_csv(&text, natural_key).map_err(|source| {
                DispatchError::Csv {
                    path: failed_path.clone(),
                    source,
                }
            })?,
            None => Vec::new(),
        };

        tracing::debug!(
            job_id,
            succeeded = succeeded.len(),
            failed = failed.len(),
            "Fetched bulk job results"
        );
        Ok(JobResults { succeeded, failed })
    }

    async fn query(
        &self,
        record_type: &RecordType,
        fields: &[String],
    ) -> Result<Sheet, DispatchError> {
        Self::ensure_dir(&self.work_dir).await?;
        let statement = soql(record_type.as_str(), fields);
        let wait_minutes = (self.command_timeout.as_secs() / 60).max(1);
        let args = query_args(&statement, wait_minutes, &self.target_org);
        let output = self.run(&args, &self.work_dir).await?;
        if !output.success {
            return Err(DispatchError::CommandFailed(failure_message(
                &output.stdout,
                &output.stderr,
            )));
        }
        let sheet = parse_query_csv(&output.stdout, fields)?;
        tracing::debug!(
            record_type = record_type.as_str(),
            rows = sheet.rows.len(),
            "Bulk query returned"
        );
        Ok(sheet)
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>, DispatchError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DispatchError::io(path, e)),
    }
}

fn cli_verb(operation: Operation) -> &'static str {
    match operation {
        Operation::Insert => "import",
        Operation::Update => "update",
        Operation::Upsert => "upsert",
    }
}

/// Arguments for an asynchronous bulk submission.
fn submit_args(
    record_type: &str,
    operation: Operation,
    external_id: Option<&str>,
    file: &Path,
    target_org: &str,
) -> Vec<String> {
    let mut args = vec![
        "data".to_string(),
        cli_verb(operation).to_string(),
        "bulk".to_string(),
        "--sobject".to_string(),
        record_type.to_string(),
        "--file".to_string(),
        file.display().to_string(),
        "--target-org".to_string(),
        target_org.to_string(),
    ];
    if operation == Operation::Upsert {
        args.push("--external-id".to_string());
        args.push(external_id.unwrap_or("Id").to_string());
    }
    args.push("--async".to_string());
    args.push("--json".to_string());
    args
}

/// Field list with `Id` first and no repeats.
fn query_fields(fields: &[String]) -> Vec<String> {
    let mut out = vec![REMOTE_ID.to_string()];
    for field in fields {
        if !out.contains(field) {
            out.push(field.clone());
        }
    }
    out
}

fn soql(record_type: &str, fields: &[String]) -> String {
    format!(
        "SELECT {} FROM {record_type}",
        query_fields(fields).join(", ")
    )
}

/// Arguments for a bulk query that prints CSV to stdout.
fn query_args(soql: &str, wait_minutes: u64, target_org: &str) -> Vec<String> {
    vec![
        "data".to_string(),
        "query".to_string(),
        "--query".to_string(),
        soql.to_string(),
        "--bulk".to_string(),
        "--wait".to_string(),
        wait_minutes.to_string(),
        "--result-format".to_string(),
        "csv".to_string(),
        "--target-org".to_string(),
        target_org.to_string(),
    ]
}

/// Decode bulk query CSV. Output with no header row means no records.
fn parse_query_csv(stdout: &str, fields: &[String]) -> Result<Sheet, DispatchError> {
    if stdout.trim().is_empty() {
        return Ok(Sheet::new(query_fields(fields)));
    }
    let sheet = Sheet::from_csv(stdout).map_err(|e| {
        DispatchError::MalformedResponse(format!("bulk query output is not CSV: {e}"))
    })?;
    if sheet.column_index(REMOTE_ID).is_none() {
        return Err(DispatchError::MalformedResponse(format!(
            "bulk query output has no {REMOTE_ID} column: {}",
            sheet.header.join(",")
        )));
    }
    Ok(sheet)
}

/// Encode `batch` as the tool's bulk CSV. Absent values are empty cells.
fn render_batch_csv(batch: &RecordBatch) -> String {
    let mut buf = String::new();
    csv::write_record(&mut buf, &batch.columns);
    for record in &batch.records {
        csv::write_record(
            &mut buf,
            batch
                .columns
                .iter()
                .map(|column| match record.get(column) {
                    FieldValue::Absent => "",
                    FieldValue::Text(s) => s.as_str(),
                }),
        );
    }
    buf
}

fn parse_json(stdout: &str) -> Option<Value> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// The tool wraps payloads as `{"status": 0, "result": {...}}`; raw REST
/// responses are bare objects.
fn payload(value: &Value) -> &Value {
    value.get("result").unwrap_or(value)
}

fn failure_message(stdout: &str, stderr: &str) -> String {
    parse_json(stdout)
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .or_else(|| (!stderr.is_empty()).then(|| stderr.to_string()))
        .unwrap_or_else(|| "bulk tool exited without output".to_string())
}

fn parse_org_display(stdout: &str, target_org: &str) -> Result<String, DispatchError> {
    let json = parse_json(stdout).ok_or_else(|| {
        DispatchError::MalformedResponse(format!(
            "expected JSON from org display, got: {}",
            stdout.trim()
        ))
    })?;
    Ok(payload(&json)
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or(target_org)
        .to_string())
}

fn parse_submit_response(
    success: bool,
    stdout: &str,
    stderr: &str,
    operation: Operation,
) -> Result<SubmitOutcome, DispatchError> {
    let Some(json) = parse_json(stdout) else {
        if success {
            return Err(DispatchError::MalformedResponse(format!(
                "expected JSON from bulk submission, got: {}",
                stdout.trim()
            )));
        }
        return Ok(SubmitOutcome::Rejected(failure_message(stdout, stderr)));
    };

    if json.get("name").and_then(Value::as_str) == Some(RECOVERABLE_ERROR) {
        if let Some(outcome) = recover_partial(&json, operation) {
            return Ok(outcome);
        }
    }

    let status_ok = json.get("status").and_then(Value::as_i64).unwrap_or(0) == 0;
    if !success || !status_ok {
        return Ok(SubmitOutcome::Rejected(failure_message(stdout, stderr)));
    }

    let result = payload(&json);
    let job_id = ["jobId", "id"]
        .iter()
        .find_map(|k| result.get(*k).and_then(Value::as_str))
        .ok_or_else(|| {
            DispatchError::MalformedResponse("bulk submission response has no job id".into())
        })?;
    Ok(SubmitOutcome::Accepted(SyncJob::submitted(job_id, operation)))
}

fn recover_partial(json: &Value, operation: Operation) -> Option<SubmitOutcome> {
    let job_id = json
        .get("actions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find_map(|action| JOB_ID_HINT_RE.captures(action))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())?;

    let failed_hint = json
        .get("message")
        .and_then(Value::as_str)
        .and_then(|msg| FAILED_COUNT_RE.captures(msg))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);

    Some(SubmitOutcome::RecoveredPartial {
        job: SyncJob::submitted(job_id, operation),
        failed_hint,
    })
}

fn count(result: &Value, keys: &[&str]) -> u64 {
    keys.iter()
        .find_map(|k| {
            let v = result.get(*k)?;
            v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        })
        .unwrap_or(0)
}

fn parse_poll_response(stdout: &str) -> Result<JobPoll, DispatchError> {
    let json = parse_json(stdout).ok_or_else(|| {
        DispatchError::MalformedResponse(format!("expected JSON job info, got: {}", stdout.trim()))
    })?;
    let info = payload(&json);

    let counts = JobCounts {
        processed: count(info, &["numberRecordsProcessed", "processedRecords"]),
        failed: count(info, &["numberRecordsFailed", "failedRecords"]),
        created: count(info, &["numberRecordsCreated", "successfulRecords"]),
    };
    let state = info
        .get("state")
        .and_then(Value::as_str)
        .ok_or_else(|| DispatchError::MalformedResponse("job info has no state".into()))?;

    let status = match state {
        "Open" | "UploadComplete" | "InProgress" => JobStatus::Running,
        "JobComplete" if counts.failed > 0 => JobStatus::CompletedWithErrors,
        "JobComplete" => JobStatus::Completed,
        "Failed" | "Aborted" => JobStatus::Failed,
        other => {
            return Err(DispatchError::MalformedResponse(format!(
                "unknown job state '{other}'"
            )))
        }
    };
    Ok(JobPoll { status, counts })
}

struct ResultTable {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ResultTable {
    fn parse(text: &str) -> Result<Self, csv::CsvError> {
        let mut records = csv::parse(text)?.into_iter();
        let header = records
            .next()
            .unwrap_or_default()
            .iter()
            .map(|h| clean_field_name(h))
            .collect();
        Ok(Self {
            header,
            rows: records.collect(),
        })
    }

    fn index(&self, column: &str) -> Option<usize> {
        self.header.iter().position(|h| h == column)
    }

    fn cell(row: &[String], idx: Option<usize>) -> Option<String> {
        idx.and_then(|i| row.get(i))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

fn parse_success_csv(text: &str, natural_key: &str) -> Result<Vec<SucceededRow>, csv::CsvError> {
    let table = ResultTable::parse(text)?;
    let (id, created, key) = (
        table.index(ID_COLUMN),
        table.index(CREATED_COLUMN),
        table.index(&clean_field_name(natural_key)),
    );
    Ok(table
        .rows
        .iter()
        .filter_map(|row| {
            Some(SucceededRow {
                id: ResultTable::cell(row, id)?,
                natural_key: ResultTable::cell(row, key),
                created: ResultTable::cell(row, created)
                    .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            })
        })
        .collect())
}

fn parse_failed_csv(text: &str, natural_key: &str) -> Result<Vec<FailedRow>, csv::CsvError> {
    let table = ResultTable::parse(text)?;
    let (error, key) = (
        table.index(ERROR_COLUMN),
        table.index(&clean_field_name(natural_key)),
    );
    Ok(table
        .rows
        .iter()
        .map(|row| FailedRow {
            natural_key: ResultTable::cell(row, key),
            error: ResultTable::cell(row, error).unwrap_or_default(),
        })
        .collect())
}
