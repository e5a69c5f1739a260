//! Shared record, job, failure and status model types for recsync.
//!
//! This crate is dependency-light so the store, state and engine crates can
//! share one vocabulary without depending on each other.

pub mod csv;
pub mod failure;
pub mod job;
pub mod outcome;
pub mod progress;
pub mod record;
pub mod status;
