//! Bulk synchronization and reconciliation engine.
//!
//! Transforms outgoing record sets, dispatches them as bulk jobs, classifies
//! per-record failures and writes new external identifiers back into the
//! source store, one record type at a time in dependency order. Pulls
//! refresh source sheets from the remote system.

#![warn(clippy::pedantic)]

pub(crate) mod archive;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod orchestrator;
pub mod reconcile;
pub mod registry;
pub mod report;
pub mod transform;

pub use classify::{classify, ClassifiedFailure, FailureGroup, Priority, Recommendation};
pub use dispatch::{BulkApi, DispatchError, Dispatcher, SfCliBulkApi};
pub use error::SyncError;
pub use orchestrator::{EngineOptions, RunRequest, SyncEngine, SyncHandle};
pub use registry::{RecordTypeSpec, Registry, RegistryError};
pub use report::{PullOutcome, PullReport, SyncReport, TypeOutcome, TypeStatus};
pub use transform::FieldTransform;
