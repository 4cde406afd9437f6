use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::options::GenerationOptions;

/// Base64-encoded image bytes as returned by the model service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImagePayload(String);

impl ImagePayload {
    pub fn from_base64(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(BASE64.encode(bytes))
    }

    pub fn as_base64(&self) -> &str {
        &self.0
    }

    pub fn decode(&self) -> anyhow::Result<Vec<u8>> {
        BASE64
            .decode(self.0.as_bytes())
            .context("image payload base64 decode failed")
    }
}

/// One completed generation bundled with the options that produced it.
/// Fields are read-only once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    id: String,
    timestamp: i64,
    options: GenerationOptions,
    images: Vec<ImagePayload>,
}

impl HistoryEntry {
    pub fn new(
        id: impl Into<String>,
        timestamp: i64,
        options: GenerationOptions,
        images: Vec<ImagePayload>,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp,
            options,
            images,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    pub fn images(&self) -> &[ImagePayload] {
        &self.images
    }

    pub fn title(&self) -> &str {
        let prompt = self.options.prompt().trim();
        if prompt.is_empty() {
            "Untitled"
        } else {
            prompt
        }
    }
}

pub fn format_time_ago(timestamp_ms: i64, now_ms: i64) -> String {
    let seconds = now_ms.saturating_sub(timestamp_ms).max(0) / 1000;
    if seconds < 5 {
        return "just now".to_string();
    }
    if seconds < 60 {
        return format!("{seconds}s ago");
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{minutes}m ago");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{hours}h ago");
    }
    format!("{}d ago", hours / 24)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::options::OptionUpdate;

    #[test]
    fn time_ago_buckets() {
        let now = 10_000_000;
        assert_eq!(format_time_ago(now - 4_999, now), "just now");
        assert_eq!(format_time_ago(now - 5_000, now), "5s ago");
        assert_eq!(format_time_ago(now - 59_999, now), "59s ago");
        assert_eq!(format_time_ago(now - 60_000, now), "1m ago");
        assert_eq!(format_time_ago(now - 3_600_000, now), "1h ago");
        assert_eq!(format_time_ago(now - 86_400_000 * 3, now), "3d ago");
        assert_eq!(format_time_ago(now + 1_000, now), "just now");
    }

    #[test]
    fn time_ago_survives_extreme_timestamps() {
        assert_eq!(format_time_ago(i64::MAX, 1_000), "just now");
        assert_eq!(
            format_time_ago(i64::MIN, 1_000),
            format!("{}d ago", i64::MAX / 1000 / 3600 / 24)
        );
    }

    #[test]
    fn entry_serializes_in_persisted_layout() {
        let mut options = GenerationOptions::default();
        options.apply(OptionUpdate::Prompt("fox".into())).unwrap();
        let entry = HistoryEntry::new(
            "gen_1",
            1,
            options,
            vec![ImagePayload::from_base64("AAAA")],
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["id"], json!("gen_1"));
        assert_eq!(value["timestamp"], json!(1));
        assert_eq!(value["options"]["prompt"], json!("fox"));
        assert_eq!(value["images"], json!(["AAAA"]));
    }

    #[test]
    fn untitled_when_prompt_blank() {
        let entry = HistoryEntry::new("gen_1", 1, GenerationOptions::default(), Vec::new());
        assert_eq!(entry.title(), "Untitled");
    }

    #[test]
    fn payload_decodes_bytes() -> anyhow::Result<()> {
        let payload = ImagePayload::from_bytes(&[0xff, 0xd8, 0xff]);
        assert_eq!(payload.decode()?, vec![0xff, 0xd8, 0xff]);
        assert!(ImagePayload::from_base64("***").decode().is_err());
        Ok(())
    }
}
