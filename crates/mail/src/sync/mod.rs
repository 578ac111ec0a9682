//! Sync engine for fetching mail into thread documents
//!
//! Runs are idempotent: re-running with nothing new on the server leaves
//! every document byte-identical.

mod engine;
mod report;

pub use engine::{SyncEngine, SyncOptions};
pub use report::{AccountOutcome, AccountReport, LabelOutcome, LabelReport, SyncReport};
