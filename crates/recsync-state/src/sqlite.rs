//! `SQLite`-backed implementation of [`StatusBackend`].
//!
//! Uses a single `Mutex<Connection>` for thread safety.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{NaiveDateTime, Utc};
use recsync_types::failure::{FailureCategory, FailureRecord};
use recsync_types::job::Operation;
use recsync_types::record::RecordType;
use recsync_types::status::{RunStats, RunStatus, SyncState, SyncStatus};
use rusqlite::{Connection, OptionalExtension};

use crate::backend::StatusBackend;
use crate::error::{self, StateError};

/// `SQLite` datetime format (UTC, no timezone suffix).
const SQLITE_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Idempotent DDL for status tables.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS sync_status (
    record_type TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    last_sync TEXT,
    record_count INTEGER NOT NULL DEFAULT 0,
    records_processed INTEGER NOT NULL DEFAULT 0,
    records_failed INTEGER NOT NULL DEFAULT 0,
    message TEXT,
    fingerprint TEXT,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS sync_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    record_type TEXT NOT NULL,
    operation TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL DEFAULT (datetime('now')),
    finished_at TEXT,
    records_read INTEGER DEFAULT 0,
    records_processed INTEGER DEFAULT 0,
    records_failed INTEGER DEFAULT 0,
    identifiers_written INTEGER DEFAULT 0,
    job_id TEXT,
    error_message TEXT
);

CREATE TABLE IF NOT EXISTS failure_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES sync_runs(id),
    record_type TEXT NOT NULL,
    natural_key TEXT,
    row_number INTEGER,
    error_message TEXT NOT NULL,
    category TEXT NOT NULL,
    resolution TEXT NOT NULL,
    failed_at TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_failures_run ON failure_records (run_id);
CREATE INDEX IF NOT EXISTS idx_runs_type ON sync_runs (record_type);
";

const SELECT_STATUS: &str = "SELECT record_type, state, last_sync, record_count, \
     records_processed, records_failed, message, fingerprint FROM sync_status";

/// `SQLite`-backed status storage.
///
/// Create with [`SqliteStatusBackend::open`] for file-backed persistence
/// or [`SqliteStatusBackend::in_memory`] for tests.
pub struct SqliteStatusBackend {
    conn: Mutex<Connection>,
}

impl SqliteStatusBackend {
    /// Open or create a `SQLite` status database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created,
    /// or [`StateError::Sqlite`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory `SQLite` backend (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Sqlite`] if the in-memory database can't
    /// be initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    /// Convert a `SQLite` datetime string to ISO-8601.
    fn sqlite_to_iso8601(raw: &str) -> String {
        NaiveDateTime::parse_from_str(raw, SQLITE_DATETIME_FMT).map_or_else(
            |_| raw.to_string(),
            |ndt| format!("{}Z", ndt.format("%Y-%m-%dT%H:%M:%S")),
        )
    }

    /// Convert an ISO-8601 string to `SQLite` datetime format.
    fn iso8601_to_sqlite(iso: &str) -> String {
        chrono::DateTime::parse_from_rfc3339(iso).map_or_else(
            |_| iso.to_string(),
            |dt| dt.with_timezone(&Utc).format(SQLITE_DATETIME_FMT).to_string(),
        )
    }

    #[allow(clippy::cast_sign_loss)]
    fn row_to_status(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncStatus> {
        let state: String = row.get(1)?;
        let last_sync: Option<String> = row.get(2)?;
        Ok(SyncStatus {
            record_type: row.get(0)?,
            state: SyncState::parse(&state),
            last_sync: last_sync.as_deref().map(Self::sqlite_to_iso8601),
            record_count: row.get::<_, i64>(3)? as u64,
            records_processed: row.get::<_, i64>(4)? as u64,
            records_failed: row.get::<_, i64>(5)? as u64,
            message: row.get(6)?,
            fingerprint: row.get(7)?,
        })
    }

    #[cfg(test)]
    fn get_run_row(&self, run_id: i64) -> error::Result<(String, i64, Option<String>, Option<String>)> {
        let conn = self.lock_conn()?;
        Ok(conn.query_row(
            "SELECT status, records_processed, finished_at, job_id FROM sync_runs WHERE id = ?1",
            [run_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?)
    }

    #[cfg(test)]
    fn count_failures_for_run(&self, run_id: i64) -> error::Result<i64> {
        let conn = self.lock_conn()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM failure_records WHERE run_id = ?1",
            [run_id],
            |row| row.get(0),
        )?)
    }
}

impl StatusBackend for SqliteStatusBackend {
    fn get_status(&self, record_type: &RecordType) -> error::Result<SyncStatus> {
        let conn = self.lock_conn()?;
        let status = conn
            .query_row(
                &format!("{SELECT_STATUS} WHERE record_type = ?1"),
                [record_type.as_str()],
                Self::row_to_status,
            )
            .optional()?;
        Ok(status.unwrap_or_else(|| SyncStatus::not_synced(record_type.as_str())))
    }

    fn list_statuses(&self) -> error::Result<Vec<SyncStatus>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!("{SELECT_STATUS} ORDER BY record_type"))?;
        let rows = stmt.query_map([], Self::row_to_status)?;
        let mut statuses = Vec::new();
        for row in rows {
            statuses.push(row?);
        }
        Ok(statuses)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn put_status(&self, status: &SyncStatus) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let last_sync = status.last_sync.as_deref().map(Self::iso8601_to_sqlite);
        conn.execute(
            "INSERT INTO sync_status (record_type, state, last_sync, record_count, \
             records_processed, records_failed, message, fingerprint, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now')) \
             ON CONFLICT(record_type) DO UPDATE SET state = ?2, last_sync = ?3, \
             record_count = ?4, records_processed = ?5, records_failed = ?6, \
             message = ?7, fingerprint = ?8, updated_at = datetime('now')",
            rusqlite::params![
                status.record_type,
                status.state.as_str(),
                last_sync,
                status.record_count as i64,
                status.records_processed as i64,
                status.records_failed as i64,
                status.message,
                status.fingerprint,
            ],
        )?;
        Ok(())
    }

    fn mark_modified(&self, record_type: &RecordType) -> error::Result<bool> {
        let conn = self.lock_conn()?;
        let current: Option<String> = conn
            .query_row(
                "SELECT state FROM sync_status WHERE record_type = ?1",
                [record_type.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let current = current.map_or(SyncState::NotSynced, |s| SyncState::parse(&s));
        if !current.can_transition_to(SyncState::Modified) {
            return Ok(false);
        }
        conn.execute(
            "UPDATE sync_status SET state = ?1, updated_at = datetime('now') WHERE record_type = ?2",
            rusqlite::params![SyncState::Modified.as_str(), record_type.as_str()],
        )?;
        Ok(true)
    }

    fn reset_status(&self, record_type: &RecordType) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "DELETE FROM sync_status WHERE record_type = ?1",
            [record_type.as_str()],
        )?;
        Ok(())
    }

    fn start_run(&self, record_type: &RecordType, operation: Operation) -> error::Result<i64> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO sync_runs (record_type, operation, status) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                record_type.as_str(),
                operation.as_str(),
                RunStatus::Running.as_str()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let updated = conn.execute(
            "UPDATE sync_runs SET status = ?1, finished_at = datetime('now'), \
             records_read = ?2, records_processed = ?3, records_failed = ?4, \
             identifiers_written = ?5, job_id = ?6, error_message = ?7 \
             WHERE id = ?8",
            rusqlite::params![
                status.as_str(),
                stats.records_read as i64,
                stats.records_processed as i64,
                stats.records_failed as i64,
                stats.identifiers_written as i64,
                stats.job_id,
                stats.error_message,
                run_id,
            ],
        )?;
        if updated == 0 {
            return Err(StateError::UnknownRun(run_id));
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn insert_failure_records(&self, run_id: i64, records: &[FailureRecord]) -> error::Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0u64;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO failure_records (run_id, record_type, natural_key, row_number, \
                 error_message, category, resolution, failed_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for record in records {
                let failed_at = Self::iso8601_to_sqlite(&record.failed_at);
                stmt.execute(rusqlite::params![
                    run_id,
                    record.record_type,
                    record.natural_key,
                    record.row.map(|r| r as i64),
                    record.error_message,
                    record.category.as_str(),
                    record.resolution,
                    failed_at,
                ])?;
                inserted += 1;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    fn recent_failures(
        &self,
        record_type: &RecordType,
        limit: usize,
    ) -> error::Result<Vec<FailureRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT record_type, natural_key, row_number, error_message, category, \
             resolution, failed_at FROM failure_records \
             WHERE record_type = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![record_type.as_str(), limit as i64],
            |row| {
                let row_number: Option<i64> = row.get(2)?;
                let category: String = row.get(4)?;
                let failed_at: String = row.get(6)?;
                Ok(FailureRecord {
                    record_type: row.get(0)?,
                    natural_key: row.get(1)?,
                    row: row_number.map(|r| r as usize),
                    error_message: row.get(3)?,
                    category: FailureCategory::parse(&category).unwrap_or(FailureCategory::System),
                    resolution: row.get(5)?,
                    failed_at: Self::sqlite_to_iso8601(&failed_at),
                })
            },
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synced(record_type: &str) -> SyncStatus {
        SyncStatus {
            record_type: record_type.into(),
            state: SyncState::Synced,
            last_sync: Some("2026-03-01T12:30:00Z".into()),
            record_count: 12,
            records_processed: 12,
            records_failed: 0,
            message: Some("ok".into()),
            fingerprint: Some("abc".into()),
        }
    }

    #[test]
    fn unknown_record_type_is_not_synced() {
        let backend = SqliteStatusBackend::in_memory().unwrap();
        let status = backend.get_status(&RecordType::new("Product2")).unwrap();
        assert_eq!(status, SyncStatus::not_synced("Product2"));
    }

    #[test]
    fn put_and_get_roundtrip_keeps_iso_timestamps() {
        let backend = SqliteStatusBackend::in_memory().unwrap();
        let status = synced("Product2");
        backend.put_status(&status).unwrap();
        let back = backend.get_status(&RecordType::new("Product2")).unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn put_status_overwrites() {
        let backend = SqliteStatusBackend::in_memory().unwrap();
        backend.put_status(&synced("Product2")).unwrap();
        let mut failed = synced("Product2");
        failed.state = SyncState::Failed;
        failed.records_failed = 12;
        backend.put_status(&failed).unwrap();
        let back = backend.get_status(&RecordType::new("Product2")).unwrap();
        assert_eq!(back.state, SyncState::Failed);
        assert_eq!(back.records_failed, 12);
        assert_eq!(backend.list_statuses().unwrap().len(), 1);
    }

    #[test]
    fn list_is_ordered_by_record_type() {
        let backend = SqliteStatusBackend::in_memory().unwrap();
        backend.put_status(&synced("ProductCategory")).unwrap();
        backend.put_status(&synced("Pricebook2")).unwrap();
        let names: Vec<String> = backend
            .list_statuses()
            .unwrap()
            .into_iter()
            .map(|s| s.record_type)
            .collect();
        assert_eq!(names, vec!["Pricebook2", "ProductCategory"]);
    }

    #[test]
    fn mark_modified_only_from_synced_states() {
        let backend = SqliteStatusBackend::in_memory().unwrap();
        let product = RecordType::new("Product2");
        assert!(!backend.mark_modified(&product).unwrap());

        backend.put_status(&synced("Product2")).unwrap();
        assert!(backend.mark_modified(&product).unwrap());
        assert_eq!(backend.get_status(&product).unwrap().state, SyncState::Modified);

        let mut failed = synced("Pricebook2");
        failed.state = SyncState::Failed;
        backend.put_status(&failed).unwrap();
        assert!(!backend.mark_modified(&RecordType::new("Pricebook2")).unwrap());
    }

    #[test]
    fn reset_returns_to_not_synced() {
        let backend = SqliteStatusBackend::in_memory().unwrap();
        backend.put_status(&synced("Product2")).unwrap();
        backend.reset_status(&RecordType::new("Product2")).unwrap();
        let status = backend.get_status(&RecordType::new("Product2")).unwrap();
        assert_eq!(status.state, SyncState::NotSynced);
        assert!(backend.list_statuses().unwrap().is_empty());
    }

    #[test]
    fn summary_counts_persisted_states() {
        let backend = SqliteStatusBackend::in_memory().unwrap();
        backend.put_status(&synced("A")).unwrap();
        let mut partial = synced("B");
        partial.state = SyncState::PartiallySynced;
        backend.put_status(&partial).unwrap();
        let summary = backend.summary().unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.synced, 1);
        assert_eq!(summary.partially_synced, 1);
    }

    #[test]
    fn run_lifecycle() {
        let backend = SqliteStatusBackend::in_memory().unwrap();
        let run_id = backend
            .start_run(&RecordType::new("Product2"), Operation::Upsert)
            .unwrap();
        let (status, _, finished, _) = backend.get_run_row(run_id).unwrap();
        assert_eq!(status, "running");
        assert!(finished.is_none());

        let stats = RunStats {
            records_read: 3,
            records_processed: 3,
            records_failed: 1,
            identifiers_written: 2,
            job_id: Some("750x01".into()),
            error_message: None,
        };
        backend
            .complete_run(run_id, RunStatus::PartiallyCompleted, &stats)
            .unwrap();
        let (status, processed, finished, job_id) = backend.get_run_row(run_id).unwrap();
        assert_eq!(status, "partially_completed");
        assert_eq!(processed, 3);
        assert!(finished.is_some());
        assert_eq!(job_id.as_deref(), Some("750x01"));

        let err = backend
            .complete_run(run_id + 100, RunStatus::Completed, &stats)
            .unwrap_err();
        assert!(matches!(err, StateError::UnknownRun(_)));
    }

    #[test]
    fn failure_records_are_archived() {
        let backend = SqliteStatusBackend::in_memory().unwrap();
        let run_id = backend
            .start_run(&RecordType::new("Product2"), Operation::Insert)
            .unwrap();
        let records = vec![
            FailureRecord {
                record_type: "Product2".into(),
                natural_key: Some("Widget".into()),
                row: Some(2),
                error_message: "REQUIRED_FIELD_MISSING: Name".into(),
                category: FailureCategory::Data,
                resolution: "Fill it in".into(),
                failed_at: "2026-03-01T12:00:00Z".into(),
            },
            FailureRecord {
                record_type: "Product2".into(),
                natural_key: None,
                row: None,
                error_message: "boom".into(),
                category: FailureCategory::System,
                resolution: "Ask an admin".into(),
                failed_at: "2026-03-01T12:00:01Z".into(),
            },
        ];
        assert_eq!(backend.insert_failure_records(run_id, &records).unwrap(), 2);
        assert_eq!(backend.count_failures_for_run(run_id).unwrap(), 2);
        assert_eq!(backend.insert_failure_records(run_id, &[]).unwrap(), 0);

        let recent = backend
            .recent_failures(&RecordType::new("Product2"), 10)
            .unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].error_message, "boom");
        assert_eq!(recent[1], records[0]);
        assert_eq!(
            backend
                .recent_failures(&RecordType::new("Product2"), 1)
                .unwrap()
                .len(),
            1
        );
        assert!(backend
            .recent_failures(&RecordType::new("Pricebook2"), 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("status.db");
        let backend = SqliteStatusBackend::open(&path).unwrap();
        backend.put_status(&synced("Product2")).unwrap();
        drop(backend);

        let reopened = SqliteStatusBackend::open(&path).unwrap();
        assert_eq!(
            reopened.get_status(&RecordType::new("Product2")).unwrap().state,
            SyncState::Synced
        );
    }

    #[test]
    fn timestamp_conversion_helpers() {
        assert_eq!(
            SqliteStatusBackend::iso8601_to_sqlite("2026-01-15T10:00:00Z"),
            "2026-01-15 10:00:00"
        );
        assert_eq!(
            SqliteStatusBackend::sqlite_to_iso8601("2026-01-15 10:00:00"),
            "2026-01-15T10:00:00Z"
        );
        assert_eq!(SqliteStatusBackend::sqlite_to_iso8601("garbage"), "garbage");
    }
}
