use std::collections::HashSet;

use anyhow::Context;
use serde_json::Value;

use super::entry::{HistoryEntry, ImagePayload};
use crate::options::GenerationOptions;
use crate::storage::KeyValueStorage;

pub const HISTORY_KEY: &str = "generationHistory";
/// 9999-12-31T23:59:59.999Z
const MAX_TIMESTAMP_MS: i64 = 253_402_300_799_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub removed: bool,
    pub selection_changed: bool,
}

/// Newest-first generation log plus the current selection.
///
/// Every mutation rewrites the whole serialized log before returning. The
/// in-memory change is kept even if that write fails; the error is handed
/// back so the caller can report it.
pub struct HistoryStore {
    storage: Box<dyn KeyValueStorage>,
    entries: Vec<HistoryEntry>,
    selected_id: Option<String>,
    revision: u64,
    recovered_from_corruption: bool,
    discarded_entries: usize,
}

impl HistoryStore {
    /// Reads the persisted log. A payload that is not a list is removed from
    /// storage and the store starts empty. Individual entries that fail
    /// validation are dropped and the cleaned log is written back.
    pub fn load(mut storage: Box<dyn KeyValueStorage>) -> Self {
        let mut recovered_from_corruption = false;
        let mut discarded_entries = 0;
        let entries = match storage.get(HISTORY_KEY) {
            Ok(Some(raw)) => match parse_history(&raw) {
                Ok((entries, discarded)) => {
                    discarded_entries = discarded;
                    entries
                }
                Err(err) => {
                    log::warn!("discarding unreadable generation history: {err:#}");
                    recovered_from_corruption = true;
                    if let Err(err) = storage.remove(HISTORY_KEY) {
                        log::error!("failed to purge corrupt generation history: {err:#}");
                    }
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(err) => {
                log::warn!("failed to read generation history: {err:#}");
                Vec::new()
            }
        };
        log::debug!("loaded {} history entries", entries.len());

        let mut store = Self {
            storage,
            entries,
            selected_id: None,
            revision: 0,
            recovered_from_corruption,
            discarded_entries,
        };
        if discarded_entries > 0 {
            log::warn!("dropped {discarded_entries} invalid history entries");
            if let Err(err) = store.persist() {
                log::error!("{err:#}");
            }
        }
        store
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|entry| entry.id() == id)
    }

    pub fn front(&self) -> Option<&HistoryEntry> {
        self.entries.first()
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected_id.as_deref()
    }

    pub fn selected(&self) -> Option<&HistoryEntry> {
        self.selected_id.as_deref().and_then(|id| self.get(id))
    }

    /// Bumped on every mutation of the entry list.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn recovered_from_corruption(&self) -> bool {
        self.recovered_from_corruption
    }

    /// Persisted records skipped at load (invalid or duplicate ids).
    pub fn discarded_entries(&self) -> usize {
        self.discarded_entries
    }

    /// Builds the entry for a finished generation. Ids are `gen_<millis>`;
    /// the timestamp is nudged forward when needed so ids stay unique and
    /// ordered by creation.
    pub fn next_entry(
        &self,
        options: &GenerationOptions,
        images: Vec<ImagePayload>,
        now_ms: i64,
    ) -> HistoryEntry {
        let mut timestamp = match self.front() {
            Some(front) => now_ms.max(front.timestamp().saturating_add(1)),
            None => now_ms,
        };
        while self.get(&entry_id(timestamp)).is_some() && timestamp < i64::MAX {
            timestamp += 1;
        }
        HistoryEntry::new(entry_id(timestamp), timestamp, options.clone(), images)
    }

    pub fn append(&mut self, entry: HistoryEntry) -> anyhow::Result<()> {
        self.entries.insert(0, entry);
        self.revision += 1;
        self.persist()
    }

    /// Marks `id` as selected. Unknown ids leave the selection untouched.
    pub fn select(&mut self, id: &str) -> Option<&HistoryEntry> {
        let index = self.entries.iter().position(|entry| entry.id() == id)?;
        self.selected_id = Some(id.to_string());
        self.entries.get(index)
    }

    /// Removes `id`. Deleting the selected entry moves the selection to the
    /// new front entry (or clears it). Unknown ids are a no-op.
    pub fn delete(&mut self, id: &str) -> anyhow::Result<DeleteOutcome> {
        let Some(index) = self.entries.iter().position(|entry| entry.id() == id) else {
            return Ok(DeleteOutcome {
                removed: false,
                selection_changed: false,
            });
        };
        self.entries.remove(index);
        self.revision += 1;

        let selection_changed = self.selected_id.as_deref() == Some(id);
        if selection_changed {
            self.selected_id = self.front().map(|entry| entry.id().to_string());
        }
        self.persist()?;
        Ok(DeleteOutcome {
            removed: true,
            selection_changed,
        })
    }

    pub fn clear(&mut self) -> anyhow::Result<()> {
        self.entries.clear();
        self.selected_id = None;
        self.revision += 1;
        self.persist()
    }

    fn persist(&mut self) -> anyhow::Result<()> {
        let serialized =
            serde_json::to_string(&self.entries).context("failed to serialize history")?;
        self.storage
            .set(HISTORY_KEY, &serialized)
            .context("failed to persist generation history")
    }
}

fn entry_id(timestamp: i64) -> String {
    format!("gen_{timestamp}")
}

/// Returns the valid entries and how many records were dropped. Duplicate
/// ids keep their first occurrence.
fn parse_history(raw: &str) -> anyhow::Result<(Vec<HistoryEntry>, usize)> {
    let records: Vec<Value> =
        serde_json::from_str(raw).context("history payload is not a list of entries")?;
    let total = records.len();
    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(total);
    for record in records {
        let entry = match serde_json::from_value::<HistoryEntry>(record) {
            Ok(entry) => entry,
            Err(err) => {
                log::warn!("skipping unreadable history entry: {err}");
                continue;
            }
        };
        if !(0..=MAX_TIMESTAMP_MS).contains(&entry.timestamp()) {
            log::warn!(
                "skipping history entry {} with timestamp {}",
                entry.id(),
                entry.timestamp()
            );
            continue;
        }
        if seen.insert(entry.id().to_string()) {
            entries.push(entry);
        }
    }
    let discarded = total - entries.len();
    Ok((entries, discarded))
}
