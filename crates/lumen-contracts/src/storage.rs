use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;

pub const NOTICE_KEY: &str = "noticeDismissed";

/// String key/value persistence that survives process restarts.
pub trait KeyValueStorage: Send {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&mut self, key: &str) -> anyhow::Result<()>;
}

/// A single JSON object file of string values.
///
/// Every write re-reads the file and only touches its own key, so two
/// handles on the same path do not clobber each other's keys.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn update(&self, key: &str, value: Option<&str>) -> anyhow::Result<()> {
        let mut on_disk = read_json_object(&self.path).unwrap_or_default();
        match value {
            Some(value) => {
                on_disk.insert(key.to_string(), Value::String(value.to_string()));
            }
            None => {
                if on_disk.remove(key).is_none() {
                    return Ok(());
                }
            }
        }
        write_json_object(&self.path, &on_disk)
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let payload = read_json_object(&self.path).unwrap_or_default();
        Ok(payload.get(key).and_then(Value::as_str).map(str::to_string))
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.update(key, Some(value))
    }

    fn remove(&mut self, key: &str) -> anyhow::Result<()> {
        self.update(key, None)
    }
}

/// In-process storage. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    values: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_values<T>(&self, f: impl FnOnce(&mut BTreeMap<String, String>) -> T) -> anyhow::Result<T> {
        let mut guard = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("memory storage lock poisoned"))?;
        Ok(f(&mut guard))
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.with_values(|values| values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.with_values(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&mut self, key: &str) -> anyhow::Result<()> {
        self.with_values(|values| {
            values.remove(key);
        })
    }
}

pub fn notice_dismissed(storage: &dyn KeyValueStorage) -> bool {
    match storage.get(NOTICE_KEY) {
        Ok(value) => value.as_deref() == Some("true"),
        Err(err) => {
            log::warn!("failed to read notice flag: {err:#}");
            false
        }
    }
}

pub fn dismiss_notice(storage: &mut dyn KeyValueStorage) -> anyhow::Result<()> {
    storage.set(NOTICE_KEY, "true")
}

fn read_json_object(path: &Path) -> Option<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    parsed.as_object().cloned()
}

/// Writes a sibling temp file and renames it over `path`, so readers see
/// either the old object or the new one.
fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;
    let mut staged = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to stage write in {}", parent.display()))?;
    serde_json::to_writer_pretty(&mut staged, &Value::Object(payload.clone()))?;
    staged.flush()?;
    staged
        .persist(path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}
