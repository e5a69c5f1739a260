//! Tabular source-of-truth storage for the recsync engine.
//!
//! A [`SourceStore`] hands out one record type's rows as a
//! [`RecordBatch`](recsync_types::record::RecordBatch) and accepts external
//! identifiers written back by natural key. [`CsvDirectoryStore`] keeps one
//! CSV sheet per record type on disk; [`MemorySourceStore`] holds sheets in
//! memory.

#![warn(clippy::pedantic)]

pub mod csv_dir;
pub mod error;
pub mod memory;
pub mod sheet;
pub mod store;

pub use csv_dir::CsvDirectoryStore;
pub use error::StoreError;
pub use memory::MemorySourceStore;
pub use sheet::Sheet;
pub use store::{IdentifierWrite, SheetBinding, SourceStore, WriteOutcome};
