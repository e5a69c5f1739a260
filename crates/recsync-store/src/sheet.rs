//! In-memory table shared by the store implementations.

use std::collections::HashMap;

use recsync_types::csv::{self, CsvError};
use recsync_types::record::{clean_field_name, FieldValue, Record, RecordBatch};

use crate::error::{self, StoreError};
use crate::store::{IdentifierWrite, SheetBinding, WriteOutcome};

/// A header row plus data rows, cells kept as raw text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sheet {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    #[must_use]
    pub fn new(header: Vec<String>) -> Self {
        Self {
            header,
            rows: Vec::new(),
        }
    }

    /// Builder-style row append, mostly for tests.
    #[must_use]
    pub fn with_row<I, S>(mut self, cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
        self
    }

    /// Decode CSV text. The first record is the header.
    ///
    /// # Errors
    ///
    /// Returns [`CsvError`] when the text is not valid CSV.
    pub fn from_csv(text: &str) -> Result<Self, CsvError> {
        let mut records = csv::parse(text)?.into_iter();
        let header = records.next().unwrap_or_default();
        Ok(Self {
            header,
            rows: records.collect(),
        })
    }

    #[must_use]
    pub fn to_csv(&self) -> String {
        let mut buf = String::new();
        csv::write_record(&mut buf, &self.header);
        for row in &self.rows {
            csv::write_record(&mut buf, row);
        }
        buf
    }

    /// Index of the column whose cleaned header equals `name`.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| clean_field_name(h) == name)
    }

    /// Project the sheet into a batch. Cells past the end of a short row
    /// read as absent; everything else is passed through as text.
    #[must_use]
    pub fn to_batch(&self, binding: &SheetBinding) -> RecordBatch {
        let mut batch = RecordBatch::new(
            binding.record_type.clone(),
            binding.natural_key.clone(),
            self.header.clone(),
        );
        for (i, row) in self.rows.iter().enumerate() {
            let mut record = Record::new(i + 1);
            for (j, column) in self.header.iter().enumerate() {
                let value = row.get(j).map_or(FieldValue::Absent, FieldValue::text);
                record.set(column.clone(), value);
            }
            batch.push(record);
        }
        batch
    }

    /// Replace every data row with the rows of `pulled`, keeping this
    /// sheet's header. Pulled columns are matched to header columns by
    /// cleaned name; header columns the pull did not return come back
    /// blank. `identifier_column` is appended when the header lacks it.
    /// Returns the number of rows now in the sheet.
    pub fn replace_rows(&mut self, pulled: &Sheet, identifier_column: &str) -> usize {
        if self.column_index(identifier_column).is_none() {
            self.header.push(identifier_column.to_string());
        }
        let sources: Vec<Option<usize>> = self
            .header
            .iter()
            .map(|h| pulled.column_index(&clean_field_name(h)))
            .collect();
        self.rows = pulled
            .rows
            .iter()
            .map(|row| {
                sources
                    .iter()
                    .map(|src| src.and_then(|i| row.get(i)).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        self.rows.len()
    }

    /// Write `id` into `column` for every row keyed by `natural_key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingColumn`] when the natural-key column is
    /// not in the header.
    pub fn set_identifier(
        &mut self,
        binding: &SheetBinding,
        column: &str,
        natural_key: &str,
        id: &str,
    ) -> error::Result<WriteOutcome> {
        let write = IdentifierWrite::new(natural_key, id);
        let mut outcomes = self.set_identifiers(binding, column, std::slice::from_ref(&write))?;
        Ok(outcomes.pop().unwrap_or(WriteOutcome::NotFound))
    }

    /// Apply a batch of identifier writes with one pass over the rows.
    /// Outcomes line up with `writes`. The column is appended only when some
    /// write matches a row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingColumn`] when the natural-key column is
    /// not in the header.
    pub fn set_identifiers(
        &mut self,
        binding: &SheetBinding,
        column: &str,
        writes: &[IdentifierWrite],
    ) -> error::Result<Vec<WriteOutcome>> {
        let key_idx =
            self.column_index(&binding.natural_key)
                .ok_or_else(|| StoreError::MissingColumn {
                    sheet: binding.sheet.clone(),
                    column: binding.natural_key.clone(),
                })?;

        let mut rows_by_key: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, row) in self.rows.iter().enumerate() {
            if let Some(cell) = row.get(key_idx) {
                rows_by_key.entry(cell.trim().to_string()).or_default().push(i);
            }
        }

        let mut id_idx = self.column_index(column);
        let mut outcomes = Vec::with_capacity(writes.len());
        for write in writes {
            let Some(matched) = rows_by_key.get(write.natural_key.trim()) else {
                outcomes.push(WriteOutcome::NotFound);
                continue;
            };
            let idx = *id_idx.get_or_insert_with(|| {
                self.header.push(column.to_string());
                self.header.len() - 1
            });

            let mut written = 0;
            for &i in matched {
                let row = &mut self.rows[i];
                if row.len() <= idx {
                    row.resize(idx + 1, String::new());
                }
                if row[idx] != write.id {
                    row[idx].clone_from(&write.id);
                    written += 1;
                }
            }
            outcomes.push(if written == 0 {
                WriteOutcome::Unchanged
            } else {
                WriteOutcome::Written(written)
            });
        }
        Ok(outcomes)
    }
}
