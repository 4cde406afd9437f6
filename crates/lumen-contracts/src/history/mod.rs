mod entry;
mod export;
mod store;

pub use entry::{format_time_ago, HistoryEntry, ImagePayload};
pub use export::{download_file_name, export_entry};
pub use store::{DeleteOutcome, HistoryStore, HISTORY_KEY};
