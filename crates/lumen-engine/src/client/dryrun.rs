use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use lumen_contracts::history::ImagePayload;
use lumen_contracts::options::AspectRatio;
use sha2::{Digest, Sha256};

use super::{ContentPart, ImageRequest, ModelTransport, TextRequest};

const PLACEHOLDER_LONG_EDGE: u32 = 256;

const RANDOM_PROMPTS: [&str; 4] = [
    "A lighthouse built from stacked teacups on a foggy cliff, soft watercolor palette",
    "An astronaut tending a bonsai garden inside a glass dome on Mars, golden hour",
    "A clockwork fox prowling a neon-lit night market, rain-slick cobblestones",
    "A library carved into a glacier, shafts of blue light, ultra-detailed",
];

/// Offline transport: flat-colour JPEG placeholders and canned text.
///
/// Colours are derived from the prompt and image index so repeated runs
/// produce identical bytes.
#[derive(Debug, Default)]
pub struct DryrunTransport {
    random_calls: AtomicU64,
}

impl DryrunTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelTransport for DryrunTransport {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn generate_images(&self, request: &ImageRequest) -> Result<Vec<ImagePayload>> {
        let (width, height) = placeholder_dims(request.aspect_ratio);
        (0..request.number_of_images.max(1))
            .map(|idx| {
                let bytes = placeholder_jpeg(width, height, &request.prompt, u64::from(idx))?;
                Ok(ImagePayload::from_bytes(&bytes))
            })
            .collect()
    }

    fn generate_text(&self, request: &TextRequest) -> Result<String> {
        if request
            .parts
            .iter()
            .any(|part| matches!(part, ContentPart::InlineImage { .. }))
        {
            return Ok("A placeholder scene with soft even lighting and a single flat colour field, minimal composition".to_string());
        }
        let text = request
            .parts
            .iter()
            .find_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::InlineImage { .. } => None,
            })
            .unwrap_or_default();
        match text.rsplit_once("\n\n") {
            Some((_, prompt)) => Ok(format!(
                "\"{}, cinematic lighting, intricate detail\"",
                prompt.trim()
            )),
            None => {
                let call = self.random_calls.fetch_add(1, Ordering::Relaxed);
                Ok(RANDOM_PROMPTS[(call as usize) % RANDOM_PROMPTS.len()].to_string())
            }
        }
    }
}

fn placeholder_dims(aspect_ratio: AspectRatio) -> (u32, u32) {
    let long = PLACEHOLDER_LONG_EDGE;
    match aspect_ratio {
        AspectRatio::Square => (long, long),
        AspectRatio::Landscape => (long, long * 9 / 16),
        AspectRatio::Portrait => (long * 9 / 16, long),
        AspectRatio::Standard => (long, long * 3 / 4),
        AspectRatio::Tall => (long * 3 / 4, long),
    }
}

fn placeholder_jpeg(width: u32, height: u32, prompt: &str, idx: u64) -> Result<Vec<u8>> {
    let (r, g, b) = color_from_prompt(prompt, idx);
    let mut image = RgbImage::new(width, height);
    for pixel in image.pixels_mut() {
        *pixel = Rgb([r, g, b]);
    }
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Jpeg)
        .context("failed to encode placeholder jpeg")?;
    Ok(buffer.into_inner())
}

fn color_from_prompt(prompt: &str, idx: u64) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(idx.to_be_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}
