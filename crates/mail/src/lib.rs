//! Mail crate - Incremental mail sync into markdown thread documents
//!
//! This crate provides:
//! - Domain models (Message, Thread, cursor state)
//! - IMAP access behind the `Mailbox` trait, plus an in-memory server for tests
//! - The markdown thread document store and cursor file
//! - Label routing into collaborator stores
//! - The sync orchestrator and the derived manifest
//!
//! Everything is blocking and single-threaded; one process owns a store at
//! a time.

pub mod config;
pub mod error;
pub mod imap;
pub mod manifest;
pub mod models;
pub mod routing;
pub mod storage;
pub mod sync;

pub use config::{Collaborator, Contact, SyncConfig};
pub use error::ConfigError;
pub use imap::{
    FolderStatus, ImapConnector, InMemoryConnector, InMemoryServer, Mailbox, MailboxConnector,
    normalize_message, thread_key_from_subject,
};
pub use manifest::{Manifest, ManifestEntry, generate_manifest};
pub use models::{
    Account, CursorState, EmailAddress, LabelCursor, Message, MessageId, Provider, SyncMode,
    Thread, ThreadId,
};
pub use routing::{LabelRoutes, RouteReport, apply_routes, build_routes};
pub use storage::{CursorStore, MergeOutcome, ThreadStore, slugify};
pub use sync::{
    AccountOutcome, AccountReport, LabelOutcome, LabelReport, SyncEngine, SyncOptions, SyncReport,
};
