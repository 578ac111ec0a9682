//! On-disk storage
//!
//! - [`ThreadStore`]: a directory of markdown thread documents
//! - [`CursorStore`]: the JSON file of per-folder fetch cursors

mod cursor_file;
mod markdown;
mod thread_store;

pub use cursor_file::CursorStore;
pub use markdown::{parse_thread_markdown, read_thread_id, thread_to_markdown};
pub use thread_store::{MergeOutcome, ThreadStore, slugify};
