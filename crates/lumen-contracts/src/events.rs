use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One JSONL row: the envelope fields followed by the flattened event.
#[derive(Serialize)]
struct JournalLine<'a, E: Serialize> {
    session_id: &'a str,
    ts: String,
    #[serde(flatten)]
    event: &'a E,
}

/// Append-only journal of one session's events.
///
/// Events are any serde type; internally tagged enums (`#[serde(tag =
/// "type")]`) give each row a `type` key next to `session_id` and `ts`.
#[derive(Debug)]
pub struct SessionJournal {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl SessionJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_session_id(path, Uuid::new_v4().to_string())
    }

    pub fn with_session_id(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            session_id: session_id.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn record<E: Serialize>(&self, event: &E) -> anyhow::Result<()> {
        self.record_at(event, Utc::now())
    }

    fn record_at<E: Serialize>(&self, event: &E, at: DateTime<Utc>) -> anyhow::Result<()> {
        let line = JournalLine {
            session_id: &self.session_id,
            ts: at.to_rfc3339_opts(SecondsFormat::Micros, true),
            event,
        };
        let mut encoded = serde_json::to_vec(&line).context("failed to encode journal event")?;
        encoded.push(b'\n');

        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("session journal lock poisoned"))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(&encoded))
            .with_context(|| format!("failed to append to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::{json, Value};

    use super::*;

    #[derive(Serialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    enum Sample {
        Opened { entries: usize },
        Closed,
    }

    fn rows(path: &std::path::Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    #[test]
    fn tagged_events_land_beside_the_envelope() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let journal = SessionJournal::with_session_id(&path, "session-1");
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().unwrap();

        journal.record_at(&Sample::Opened { entries: 3 }, at)?;

        assert_eq!(
            rows(&path),
            vec![json!({
                "session_id": "session-1",
                "ts": "2024-05-01T12:00:00.000000Z",
                "type": "opened",
                "entries": 3,
            })]
        );
        Ok(())
    }

    #[test]
    fn events_append_in_order_and_create_parent_dirs() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");
        let journal = SessionJournal::new(&path);
        assert!(!journal.session_id().is_empty());

        journal.record(&Sample::Opened { entries: 0 })?;
        journal.record(&Sample::Closed)?;

        let types: Vec<Value> = rows(&path).into_iter().map(|row| row["type"].clone()).collect();
        assert_eq!(types, vec![json!("opened"), json!("closed")]);
        Ok(())
    }
}
