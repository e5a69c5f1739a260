//! Source store trait definition.

use recsync_types::record::{RecordBatch, RecordType};

use crate::error;
use crate::sheet::Sheet;

/// Where a record type lives in the store and how its rows are keyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetBinding {
    pub record_type: RecordType,
    /// Sheet name (file stem for [`CsvDirectoryStore`](crate::CsvDirectoryStore)).
    pub sheet: String,
    /// Natural-key field, matched against cleaned header names.
    pub natural_key: String,
}

impl SheetBinding {
    #[must_use]
    pub fn new(
        record_type: impl Into<RecordType>,
        sheet: impl Into<String>,
        natural_key: impl Into<String>,
    ) -> Self {
        Self {
            record_type: record_type.into(),
            sheet: sheet.into(),
            natural_key: natural_key.into(),
        }
    }
}

/// Result of writing one identifier back into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The identifier was written into this many rows.
    Written(usize),
    /// Every matching row already carried the identifier.
    Unchanged,
    /// No row has the natural key.
    NotFound,
}

/// One natural key and the identifier to write for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierWrite {
    pub natural_key: String,
    pub id: String,
}

impl IdentifierWrite {
    #[must_use]
    pub fn new(natural_key: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            natural_key: natural_key.into(),
            id: id.into(),
        }
    }
}

/// Storage contract for the tabular source of truth.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn SourceStore>`
/// and serialize their own writes.
pub trait SourceStore: Send + Sync {
    /// Read every data row of a sheet, in sheet order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) when the sheet is missing or
    /// cannot be decoded.
    fn read(&self, binding: &SheetBinding) -> error::Result<RecordBatch>;

    /// Write `id` into `column` of every row whose natural key equals
    /// `natural_key`. The column is appended when the header lacks it; all
    /// other cells are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) when the sheet or its
    /// natural-key column is missing, or the write fails.
    fn write_identifier(
        &self,
        binding: &SheetBinding,
        column: &str,
        natural_key: &str,
        id: &str,
    ) -> error::Result<WriteOutcome>;

    /// Replace a sheet's data rows with `pulled`, keeping its header and
    /// filling `identifier_column`. See [`Sheet::replace_rows`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) when the sheet is missing or
    /// cannot be written.
    fn replace_rows(
        &self,
        binding: &SheetBinding,
        pulled: &Sheet,
        identifier_column: &str,
    ) -> error::Result<usize>;

    /// Apply many identifier writes to one sheet, returning one outcome per
    /// write in order. Implementations load and persist the sheet once.
    ///
    /// # Errors
    ///
    /// Same as [`write_identifier`](Self::write_identifier); on error no
    /// write of the batch is persisted by the bundled stores.
    fn write_identifiers(
        &self,
        binding: &SheetBinding,
        column: &str,
        writes: &[IdentifierWrite],
    ) -> error::Result<Vec<WriteOutcome>> {
        writes
            .iter()
            .map(|w| self.write_identifier(binding, column, &w.natural_key, &w.id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trait_is_object_safe() {
        fn _assert_object_safe(_: &dyn SourceStore) {}
    }

    #[test]
    fn binding_new_converts() {
        let binding = SheetBinding::new("Product2", "Products", "Name");
        assert_eq!(binding.record_type.as_str(), "Product2");
        assert_eq!(binding.sheet, "Products");
    }
}
