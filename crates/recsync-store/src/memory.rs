//! In-memory [`SourceStore`] for tests and embedding.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use recsync_types::record::RecordBatch;

use crate::error::{self, StoreError};
use crate::sheet::Sheet;
use crate::store::{IdentifierWrite, SheetBinding, SourceStore, WriteOutcome};

/// Sheets held in a mutex-guarded map keyed by sheet name.
#[derive(Default)]
pub struct MemorySourceStore {
    sheets: Mutex<HashMap<String, Sheet>>,
}

impl MemorySourceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style sheet insertion.
    #[must_use]
    pub fn with_sheet(self, name: impl Into<String>, sheet: Sheet) -> Self {
        if let Ok(mut sheets) = self.sheets.lock() {
            sheets.insert(name.into(), sheet);
        }
        self
    }

    /// Insert or replace a sheet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] if the map lock is poisoned.
    pub fn put_sheet(&self, name: impl Into<String>, sheet: Sheet) -> error::Result<()> {
        self.lock()?.insert(name.into(), sheet);
        Ok(())
    }

    /// Copy of a sheet's current contents.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SheetNotFound`] for an unknown sheet.
    pub fn sheet(&self, name: &str) -> error::Result<Sheet> {
        self.lock()?
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::SheetNotFound(name.to_string()))
    }

    fn lock(&self) -> error::Result<MutexGuard<'_, HashMap<String, Sheet>>> {
        self.sheets.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl SourceStore for MemorySourceStore {
    fn read(&self, binding: &SheetBinding) -> error::Result<RecordBatch> {
        let sheets = self.lock()?;
        let sheet = sheets
            .get(&binding.sheet)
            .ok_or_else(|| StoreError::SheetNotFound(binding.sheet.clone()))?;
        Ok(sheet.to_batch(binding))
    }

    fn write_identifier(
        &self,
        binding: &SheetBinding,
        column: &str,
        natural_key: &str,
        id: &str,
    ) -> error::Result<WriteOutcome> {
        let mut sheets = self.lock()?;
        let sheet = sheets
            .get_mut(&binding.sheet)
            .ok_or_else(|| StoreError::SheetNotFound(binding.sheet.clone()))?;
        sheet.set_identifier(binding, column, natural_key, id)
    }

    fn replace_rows(
        &self,
        binding: &SheetBinding,
        pulled: &Sheet,
        identifier_column: &str,
    ) -> error::Result<usize> {
        let mut sheets = self.lock()?;
        let sheet = sheets
            .get_mut(&binding.sheet)
            .ok_or_else(|| StoreError::SheetNotFound(binding.sheet.clone()))?;
        Ok(sheet.replace_rows(pulled, identifier_column))
    }

    fn write_identifiers(
        &self,
        binding: &SheetBinding,
        column: &str,
        writes: &[IdentifierWrite],
    ) -> error::Result<Vec<WriteOutcome>> {
        let mut sheets = self.lock()?;
        let sheet = sheets
            .get_mut(&binding.sheet)
            .ok_or_else(|| StoreError::SheetNotFound(binding.sheet.clone()))?;
        sheet.set_identifiers(binding, column, writes)
    }
}
