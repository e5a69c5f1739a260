//! Sync status persistence for the recsync engine.
//!
//! Provides the [`StatusBackend`] trait and a [`SqliteStatusBackend`]
//! implementation for per-record-type sync status, run history, and the
//! archive of failed records.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod sqlite;

pub use backend::StatusBackend;
pub use error::StateError;
pub use sqlite::SqliteStatusBackend;
