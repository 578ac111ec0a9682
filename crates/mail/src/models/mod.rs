//! Domain models for sync entities

mod account;
mod message;
mod sync_state;
mod thread;

pub use account::{Account, ImapPreset, Provider};
pub use message::{EmailAddress, Message, MessageBuilder, MessageId, date_sort_key, parse_date};
pub use sync_state::{
    AccountCursor, CursorState, FullReason, LEGACY_ACCOUNT, LabelCursor,
    SyncMode, decide_mode, filter_new_uids, since_date, window_start,
};
pub use thread::{Thread, ThreadId};
