//! Directory of CSV sheets, one `<sheet>.csv` file per record type.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use recsync_types::record::RecordBatch;

use crate::error::{self, StoreError};
use crate::sheet::Sheet;
use crate::store::{IdentifierWrite, SheetBinding, SourceStore, WriteOutcome};

/// File-backed [`SourceStore`].
///
/// Identifier writes rewrite the whole sheet through a temporary file and a
/// rename, serialized by an internal mutex.
pub struct CsvDirectoryStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvDirectoryStore {
    /// Use `root` as the sheet directory.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when `root` is not an existing directory.
    pub fn open(root: impl Into<PathBuf>) -> error::Result<Self> {
        let root = root.into();
        let meta = std::fs::metadata(&root).map_err(|e| StoreError::io(&root, e))?;
        if !meta.is_dir() {
            return Err(StoreError::io(
                &root,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn sheet_path(&self, sheet: &str) -> PathBuf {
        self.root.join(format!("{sheet}.csv"))
    }

    /// Load one sheet from disk.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SheetNotFound`] when the file does not exist, or
    /// an I/O or CSV error.
    pub fn load_sheet(&self, sheet: &str) -> error::Result<Sheet> {
        let path = self.sheet_path(sheet);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::SheetNotFound(sheet.to_string()));
            }
            Err(e) => return Err(StoreError::io(path, e)),
        };
        Sheet::from_csv(&text).map_err(|source| StoreError::Csv { path, source })
    }

    /// Replace one sheet on disk.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the file cannot be written.
    pub fn save_sheet(&self, sheet: &str, contents: &Sheet) -> error::Result<()> {
        let _guard = self.lock()?;
        self.write_file(sheet, contents)
    }

    fn write_file(&self, sheet: &str, contents: &Sheet) -> error::Result<()> {
        let path = self.sheet_path(sheet);
        let tmp = self.root.join(format!(".{sheet}.csv.tmp"));
        std::fs::write(&tmp, contents.to_csv()).map_err(|e| StoreError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| StoreError::io(&path, e))?;
        Ok(())
    }

    fn lock(&self) -> error::Result<MutexGuard<'_, ()>> {
        self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl SourceStore for CsvDirectoryStore {
    fn read(&self, binding: &SheetBinding) -> error::Result<RecordBatch> {
        let sheet = self.load_sheet(&binding.sheet)?;
        Ok(sheet.to_batch(binding))
    }

    fn write_identifier(
        &self,
        binding: &SheetBinding,
        column: &str,
        natural_key: &str,
        id: &str,
    ) -> error::Result<WriteOutcome> {
        let _guard = self.lock()?;
        let mut sheet = self.load_sheet(&binding.sheet)?;
        let outcome = sheet.set_identifier(binding, column, natural_key, id)?;
        if let WriteOutcome::Written(rows) = outcome {
            self.write_file(&binding.sheet, &sheet)?;
            tracing::debug!(
                sheet = binding.sheet.as_str(),
                natural_key,
                rows,
                "Wrote identifier"
            );
        }
        Ok(outcome)
    }

    fn replace_rows(
        &self,
        binding: &SheetBinding,
        pulled: &Sheet,
        identifier_column: &str,
    ) -> error::Result<usize> {
        let _guard = self.lock()?;
        let mut sheet = self.load_sheet(&binding.sheet)?;
        let rows = sheet.replace_rows(pulled, identifier_column);
        self.write_file(&binding.sheet, &sheet)?;
        tracing::debug!(sheet = binding.sheet.as_str(), rows, "Replaced sheet rows");
        Ok(rows)
    }

    fn write_identifiers(
        &self,
        binding: &SheetBinding,
        column: &str,
        writes: &[IdentifierWrite],
    ) -> error::Result<Vec<WriteOutcome>> {
        let _guard = self.lock()?;
        let mut sheet = self.load_sheet(&binding.sheet)?;
        let outcomes = sheet.set_identifiers(binding, column, writes)?;
        let rows: usize = outcomes
            .iter()
            .map(|o| match o {
                WriteOutcome::Written(n) => *n,
                _ => 0,
            })
            .sum();
        if rows > 0 {
            self.write_file(&binding.sheet, &sheet)?;
            tracing::debug!(
                sheet = binding.sheet.as_str(),
                identifiers = writes.len(),
                rows,
                "Wrote identifiers"
            );
        }
        Ok(outcomes)
    }
}
