use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::path::Path;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_IMAGES: u32 = 1;
pub const MAX_IMAGES: u32 = 4;
const RANDOM_SEED_CEILING: u64 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    #[error("number of images must be between 1 and 4 (got {0})")]
    ImageCountOutOfRange(u32),
    #[error("seed must be a whole number or empty (got '{0}')")]
    InvalidSeed(String),
    #[error("unknown aspect ratio '{0}' (expected one of 1:1, 16:9, 9:16, 4:3, 3:4)")]
    UnknownAspectRatio(String),
    #[error("unknown style preset '{0}'")]
    UnknownStylePreset(String),
    #[error("invalid reference image: {0}")]
    InvalidReferenceImage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "4:3")]
    Standard,
    #[serde(rename = "3:4")]
    Tall,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Landscape,
        AspectRatio::Portrait,
        AspectRatio::Standard,
        AspectRatio::Tall,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Standard => "4:3",
            AspectRatio::Tall => "3:4",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = OptionsError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value = raw.trim().replace('/', ":");
        match value.to_ascii_lowercase().as_str() {
            "square" => return Ok(AspectRatio::Square),
            "landscape" | "wide" => return Ok(AspectRatio::Landscape),
            "portrait" => return Ok(AspectRatio::Portrait),
            _ => {}
        }
        AspectRatio::ALL
            .into_iter()
            .find(|ratio| ratio.as_str() == value)
            .ok_or_else(|| OptionsError::UnknownAspectRatio(raw.trim().to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StylePreset {
    #[default]
    None,
    Photographic,
    Cinematic,
    Anime,
    DigitalArt,
    Fantasy,
    LowPoly,
    Watercolor,
    PixelArt,
    Isometric,
    LineArt,
    Sticker,
}

struct StyleSpec {
    preset: StylePreset,
    name: &'static str,
    suffix: &'static str,
}

const STYLE_TABLE: &[StyleSpec] = &[
    StyleSpec {
        preset: StylePreset::None,
        name: "none",
        suffix: "",
    },
    StyleSpec {
        preset: StylePreset::Photographic,
        name: "photographic",
        suffix: ", hyper-realistic photograph",
    },
    StyleSpec {
        preset: StylePreset::Cinematic,
        name: "cinematic",
        suffix: ", cinematic film still, dramatic lighting",
    },
    StyleSpec {
        preset: StylePreset::Anime,
        name: "anime",
        suffix: ", vibrant anime style, detailed illustration",
    },
    StyleSpec {
        preset: StylePreset::DigitalArt,
        name: "digital-art",
        suffix: ", epic digital painting, concept art, matte painting",
    },
    StyleSpec {
        preset: StylePreset::Fantasy,
        name: "fantasy",
        suffix: ", epic fantasy art, magical, otherworldly",
    },
    StyleSpec {
        preset: StylePreset::LowPoly,
        name: "low-poly",
        suffix: ", low-poly isometric 3D render",
    },
    StyleSpec {
        preset: StylePreset::Watercolor,
        name: "watercolor",
        suffix: ", a delicate watercolor painting",
    },
    StyleSpec {
        preset: StylePreset::PixelArt,
        name: "pixel-art",
        suffix: ", 8-bit pixel art",
    },
    StyleSpec {
        preset: StylePreset::Isometric,
        name: "isometric",
        suffix: ", an isometric 3D illustration",
    },
    StyleSpec {
        preset: StylePreset::LineArt,
        name: "line-art",
        suffix: ", clean black and white line art",
    },
    StyleSpec {
        preset: StylePreset::Sticker,
        name: "sticker",
        suffix: ", a cute die-cut sticker illustration",
    },
];

impl StylePreset {
    fn spec(self) -> &'static StyleSpec {
        STYLE_TABLE
            .iter()
            .find(|spec| spec.preset == self)
            .unwrap_or(&STYLE_TABLE[0])
    }

    pub fn as_str(self) -> &'static str {
        self.spec().name
    }

    /// Text appended to the user prompt before it is sent for generation.
    pub fn suffix(self) -> &'static str {
        self.spec().suffix
    }

    pub fn names() -> Vec<&'static str> {
        STYLE_TABLE.iter().map(|spec| spec.name).collect()
    }
}

impl fmt::Display for StylePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StylePreset {
    type Err = OptionsError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");
        STYLE_TABLE
            .iter()
            .find(|spec| spec.name == normalized)
            .map(|spec| spec.preset)
            .ok_or_else(|| OptionsError::UnknownStylePreset(raw.trim().to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceImage {
    pub base64: String,
    pub mime_type: String,
}

impl ReferenceImage {
    pub fn new(base64: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            base64: base64.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        if bytes.is_empty() {
            anyhow::bail!("reference image {} is empty", path.display());
        }
        Ok(Self::new(BASE64.encode(bytes), guess_image_mime(path)))
    }

    /// Accepts `data:<mime>;base64,<payload>`.
    pub fn from_data_url(url: &str) -> Result<Self, OptionsError> {
        let rest = url
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| OptionsError::InvalidReferenceImage("missing data: prefix".into()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| OptionsError::InvalidReferenceImage("missing payload".into()))?;
        let mime_type = header.strip_suffix(";base64").ok_or_else(|| {
            OptionsError::InvalidReferenceImage("payload is not base64 encoded".into())
        })?;
        if payload.is_empty() {
            return Err(OptionsError::InvalidReferenceImage("empty payload".into()));
        }
        Ok(Self::new(payload, mime_type))
    }

    pub fn decoded_len(&self) -> usize {
        self.base64.trim_end_matches('=').len() * 3 / 4
    }
}

pub fn guess_image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" | "heif" => "image/heic",
        _ => "image/png",
    }
}

/// One field replacement; the only way live options change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionUpdate {
    Prompt(String),
    AspectRatio(AspectRatio),
    NumberOfImages(u32),
    StylePreset(StylePreset),
    ReferenceImage(Option<ReferenceImage>),
    NegativePrompt(String),
    Seed(String),
}

/// Persisted snapshots go through [`StoredOptions`] so they get the same
/// checks as [`GenerationOptions::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "StoredOptions")]
pub struct GenerationOptions {
    prompt: String,
    aspect_ratio: AspectRatio,
    number_of_images: u32,
    style_preset: StylePreset,
    reference_image: Option<ReferenceImage>,
    negative_prompt: String,
    seed: String,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            aspect_ratio: AspectRatio::default(),
            number_of_images: MIN_IMAGES,
            style_preset: StylePreset::default(),
            reference_image: None,
            negative_prompt: String::new(),
            seed: String::new(),
        }
    }
}

/// Loose on-disk shape: missing fields take defaults and `null` text
/// fields read as empty.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StoredOptions {
    prompt: Option<String>,
    aspect_ratio: AspectRatio,
    number_of_images: u32,
    style_preset: StylePreset,
    reference_image: Option<ReferenceImage>,
    negative_prompt: Option<String>,
    seed: Option<String>,
}

impl Default for StoredOptions {
    fn default() -> Self {
        Self {
            prompt: None,
            aspect_ratio: AspectRatio::default(),
            number_of_images: MIN_IMAGES,
            style_preset: StylePreset::default(),
            reference_image: None,
            negative_prompt: None,
            seed: None,
        }
    }
}

impl TryFrom<StoredOptions> for GenerationOptions {
    type Error = OptionsError;

    fn try_from(stored: StoredOptions) -> Result<Self, Self::Error> {
        let mut options = GenerationOptions {
            prompt: stored.prompt.unwrap_or_default(),
            aspect_ratio: stored.aspect_ratio,
            style_preset: stored.style_preset,
            reference_image: stored.reference_image,
            negative_prompt: stored.negative_prompt.unwrap_or_default(),
            ..GenerationOptions::default()
        };
        options.apply(OptionUpdate::NumberOfImages(stored.number_of_images))?;
        options.apply(OptionUpdate::Seed(stored.seed.unwrap_or_default()))?;
        Ok(options)
    }
}

impl GenerationOptions {
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    pub fn number_of_images(&self) -> u32 {
        self.number_of_images
    }

    pub fn style_preset(&self) -> StylePreset {
        self.style_preset
    }

    pub fn reference_image(&self) -> Option<&ReferenceImage> {
        self.reference_image.as_ref()
    }

    pub fn negative_prompt(&self) -> &str {
        &self.negative_prompt
    }

    pub fn seed(&self) -> Option<&str> {
        Some(self.seed.as_str()).filter(|value| !value.is_empty())
    }

    pub fn has_prompt(&self) -> bool {
        !self.prompt.trim().is_empty()
    }

    /// Trimmed prompt with the style suffix appended.
    pub fn styled_prompt(&self) -> String {
        format!("{}{}", self.prompt.trim(), self.style_preset.suffix())
    }

    /// Replaces one field. Returns whether the value actually changed.
    pub fn apply(&mut self, update: OptionUpdate) -> Result<bool, OptionsError> {
        let before = self.clone();
        match update {
            OptionUpdate::Prompt(value) => self.prompt = value,
            OptionUpdate::AspectRatio(value) => self.aspect_ratio = value,
            OptionUpdate::NumberOfImages(value) => {
                if !(MIN_IMAGES..=MAX_IMAGES).contains(&value) {
                    return Err(OptionsError::ImageCountOutOfRange(value));
                }
                self.number_of_images = value;
            }
            OptionUpdate::StylePreset(value) => self.style_preset = value,
            OptionUpdate::ReferenceImage(value) => self.reference_image = value,
            OptionUpdate::NegativePrompt(value) => self.negative_prompt = value,
            OptionUpdate::Seed(value) => self.seed = normalize_seed(&value)?,
        }
        Ok(*self != before)
    }

    /// Drops the per-image content while keeping layout choices
    /// (aspect ratio, count, style).
    pub fn clear_content(&mut self) {
        self.prompt.clear();
        self.reference_image = None;
        self.negative_prompt.clear();
        self.seed.clear();
    }
}

fn normalize_seed(raw: &str) -> Result<String, OptionsError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    if !trimmed.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(OptionsError::InvalidSeed(trimmed.to_string()));
    }
    Ok(trimmed.to_string())
}

pub fn random_seed() -> String {
    let mut hasher = RandomState::new().build_hasher();
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_nanos())
        .unwrap_or(0)
        .hash(&mut hasher);
    (hasher.finish() % RANDOM_SEED_CEILING).to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn defaults_match_first_run_settings() {
        let options = GenerationOptions::default();
        assert_eq!(options.prompt(), "");
        assert_eq!(options.aspect_ratio(), AspectRatio::Square);
        assert_eq!(options.number_of_images(), 1);
        assert_eq!(options.style_preset(), StylePreset::None);
        assert!(options.reference_image().is_none());
        assert_eq!(options.seed(), None);
    }

    #[test]
    fn apply_replaces_one_field_and_reports_change() {
        let mut options = GenerationOptions::default();
        assert_eq!(options.apply(OptionUpdate::NumberOfImages(3)), Ok(true));
        assert_eq!(options.apply(OptionUpdate::NumberOfImages(3)), Ok(false));
        assert_eq!(options.number_of_images(), 3);
        assert_eq!(options.aspect_ratio(), AspectRatio::Square);
    }

    #[test]
    fn apply_rejects_out_of_range_count_without_mutation() {
        let mut options = GenerationOptions::default();
        assert_eq!(
            options.apply(OptionUpdate::NumberOfImages(5)),
            Err(OptionsError::ImageCountOutOfRange(5))
        );
        assert_eq!(
            options.apply(OptionUpdate::NumberOfImages(0)),
            Err(OptionsError::ImageCountOutOfRange(0))
        );
        assert_eq!(options.number_of_images(), 1);
    }

    #[test]
    fn seed_accepts_digits_or_empty() {
        let mut options = GenerationOptions::default();
        options.apply(OptionUpdate::Seed(" 42 ".to_string())).unwrap();
        assert_eq!(options.seed(), Some("42"));
        assert!(matches!(
            options.apply(OptionUpdate::Seed("abc".to_string())),
            Err(OptionsError::InvalidSeed(_))
        ));
        options.apply(OptionUpdate::Seed(String::new())).unwrap();
        assert_eq!(options.seed(), None);
    }

    #[test]
    fn setting_reference_image_to_none_clears_it() {
        let mut options = GenerationOptions::default();
        options
            .apply(OptionUpdate::ReferenceImage(Some(ReferenceImage::new(
                "AAAA",
                "image/png",
            ))))
            .unwrap();
        assert!(options.reference_image().is_some());
        options.apply(OptionUpdate::ReferenceImage(None)).unwrap();
        assert!(options.reference_image().is_none());
    }

    #[test]
    fn styled_prompt_appends_preset_suffix() {
        let mut options = GenerationOptions::default();
        options
            .apply(OptionUpdate::Prompt("  a red fox ".to_string()))
            .unwrap();
        assert_eq!(options.styled_prompt(), "a red fox");
        options
            .apply(OptionUpdate::StylePreset(StylePreset::Anime))
            .unwrap();
        assert_eq!(
            options.styled_prompt(),
            "a red fox, vibrant anime style, detailed illustration"
        );
    }

    #[test]
    fn style_table_round_trips_names() {
        for name in StylePreset::names() {
            let preset: StylePreset = name.parse().unwrap();
            assert_eq!(preset.as_str(), name);
            assert_eq!(serde_json::to_value(preset).unwrap(), json!(name));
        }
        assert_eq!(
            "cinematic".parse::<StylePreset>().unwrap().suffix(),
            ", cinematic film still, dramatic lighting"
        );
        assert!("vaporwave".parse::<StylePreset>().is_err());
    }

    #[test]
    fn aspect_ratio_parses_aliases() {
        assert_eq!("16/9".parse::<AspectRatio>(), Ok(AspectRatio::Landscape));
        assert_eq!("portrait".parse::<AspectRatio>(), Ok(AspectRatio::Portrait));
        assert_eq!("3:4".parse::<AspectRatio>(), Ok(AspectRatio::Tall));
        assert!("2:1".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn serialized_options_use_camel_case_wire_names() {
        let mut options = GenerationOptions::default();
        options
            .apply(OptionUpdate::AspectRatio(AspectRatio::Landscape))
            .unwrap();
        options
            .apply(OptionUpdate::StylePreset(StylePreset::DigitalArt))
            .unwrap();
        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(value["aspectRatio"], json!("16:9"));
        assert_eq!(value["numberOfImages"], json!(1));
        assert_eq!(value["stylePreset"], json!("digital-art"));
        assert_eq!(value["referenceImage"], json!(null));
        assert_eq!(value["negativePrompt"], json!(""));
    }

    #[test]
    fn partial_snapshot_fills_defaults() {
        let options: GenerationOptions =
            serde_json::from_value(json!({"prompt": "castle", "numberOfImages": 2})).unwrap();
        assert_eq!(options.prompt(), "castle");
        assert_eq!(options.number_of_images(), 2);
        assert_eq!(options.aspect_ratio(), AspectRatio::Square);
        assert_eq!(options.style_preset(), StylePreset::None);
    }

    #[test]
    fn snapshot_with_null_text_fields_reads_as_empty() {
        let options: GenerationOptions = serde_json::from_value(json!({
            "prompt": "castle",
            "negativePrompt": null,
            "seed": null,
        }))
        .unwrap();
        assert_eq!(options.negative_prompt(), "");
        assert_eq!(options.seed(), None);
    }

    #[test]
    fn snapshot_with_invalid_values_is_refused() {
        for count in [0, 5, 99] {
            let result = serde_json::from_value::<GenerationOptions>(
                json!({"prompt": "fox", "numberOfImages": count}),
            );
            assert!(result.is_err(), "count {count} should not load");
        }
        let result =
            serde_json::from_value::<GenerationOptions>(json!({"prompt": "fox", "seed": "abc"}));
        assert!(result.unwrap_err().to_string().contains("seed"));

        let options: GenerationOptions =
            serde_json::from_value(json!({"seed": " 12 "})).unwrap();
        assert_eq!(options.seed(), Some("12"));
    }

    #[test]
    fn clear_content_keeps_layout_choices() {
        let mut options = GenerationOptions::default();
        options.apply(OptionUpdate::Prompt("x".into())).unwrap();
        options.apply(OptionUpdate::NumberOfImages(4)).unwrap();
        options.apply(OptionUpdate::Seed("7".into())).unwrap();
        options
            .apply(OptionUpdate::NegativePrompt("blur".into()))
            .unwrap();
        options.clear_content();
        assert_eq!(options.prompt(), "");
        assert_eq!(options.seed(), None);
        assert_eq!(options.negative_prompt(), "");
        assert_eq!(options.number_of_images(), 4);
    }

    #[test]
    fn data_url_reference_keeps_payload_after_comma() {
        let image = ReferenceImage::from_data_url("data:image/webp;base64,UklGRg==").unwrap();
        assert_eq!(image.mime_type, "image/webp");
        assert_eq!(image.base64, "UklGRg==");
        assert!(ReferenceImage::from_data_url("image/png;base64,AAAA").is_err());
        assert!(ReferenceImage::from_data_url("data:image/png;base64,").is_err());
    }

    #[test]
    fn decoded_len_accounts_for_padding() {
        assert_eq!(ReferenceImage::new("AA==", "image/png").decoded_len(), 1);
        assert_eq!(ReferenceImage::new("AAA=", "image/png").decoded_len(), 2);
        assert_eq!(ReferenceImage::new("QUJD", "image/png").decoded_len(), 3);
        assert_eq!(ReferenceImage::new("UklGRg==", "image/webp").decoded_len(), 4);
    }

    #[test]
    fn reference_image_from_path_encodes_bytes() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("ref.JPG");
        std::fs::write(&path, [1u8, 2, 3])?;
        let image = ReferenceImage::from_path(&path)?;
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.base64, "AQID");
        Ok(())
    }

    #[test]
    fn random_seed_is_numeric_and_bounded() {
        for _ in 0..16 {
            let seed = random_seed();
            let value: u64 = seed.parse().unwrap();
            assert!(value < RANDOM_SEED_CEILING);
        }
    }
}
