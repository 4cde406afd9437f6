//! Remote generation client.
//!
//! [`ModelTransport`] is the raw wire seam (one image endpoint, one text
//! endpoint). [`GenerationClient`] layers the four user-facing operations on
//! top: style suffixes, quote trimming, and collapsing every transport failure
//! into one generic [`ClientError`] per category. Raw provider errors are
//! logged here and never returned.

mod dryrun;
mod gemini;

use std::fmt;
use std::sync::OnceLock;

use lumen_contracts::history::ImagePayload;
use lumen_contracts::options::{AspectRatio, GenerationOptions};
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

pub use dryrun::DryrunTransport;
pub use gemini::GeminiTransport;

pub const OUTPUT_MIME_TYPE: &str = "image/jpeg";

const IMPROVE_INSTRUCTION: &str = "Refine this image generation prompt to be more vivid, descriptive, and imaginative. Return only the improved prompt text, without any introductory phrases like \"Here's the improved prompt:\":";
const RANDOM_INSTRUCTION: &str = "Generate a single, random, highly-detailed and creative prompt for an image generation AI. Focus on a unique subject, setting, and style. Return only the prompt text.";
const DESCRIBE_INSTRUCTION: &str = "Describe this image in detail. Create a rich, descriptive prompt that could be used to recreate this image with an AI image generator.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub prompt: String,
    pub number_of_images: u32,
    pub aspect_ratio: AspectRatio,
    pub output_mime_type: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    InlineImage { base64: String, mime_type: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SamplingConfig {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub thinking_budget: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextRequest {
    pub parts: Vec<ContentPart>,
    pub sampling: SamplingConfig,
}

pub trait ModelTransport: Send + Sync {
    fn name(&self) -> &str;
    fn is_configured(&self) -> bool;
    fn generate_images(&self, request: &ImageRequest) -> anyhow::Result<Vec<ImagePayload>>;
    fn generate_text(&self, request: &TextRequest) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptActionKind {
    Improve,
    Random,
    Describe,
}

impl PromptActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PromptActionKind::Improve => "improve",
            PromptActionKind::Random => "random",
            PromptActionKind::Describe => "describe",
        }
    }

    pub fn failure_message(self) -> &'static str {
        match self {
            PromptActionKind::Improve => "Failed to get prompt suggestion.",
            PromptActionKind::Random => "Failed to get a random prompt.",
            PromptActionKind::Describe => "Failed to describe the image.",
        }
    }
}

impl fmt::Display for PromptActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("API key is not configured. Please set the API_KEY environment variable.")]
    Configuration,
    #[error("Image generation failed. This can happen due to safety filters or a restrictive prompt. Please try again with a modified prompt.")]
    GenerationFailed,
    #[error("{}", .0.failure_message())]
    PromptActionFailed(PromptActionKind),
}

pub struct GenerationClient {
    transport: Box<dyn ModelTransport>,
}

impl GenerationClient {
    pub fn new<T: ModelTransport + 'static>(transport: T) -> Self {
        Self::from_boxed(Box::new(transport))
    }

    pub fn from_boxed(transport: Box<dyn ModelTransport>) -> Self {
        Self { transport }
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    pub fn is_configured(&self) -> bool {
        self.transport.is_configured()
    }

    pub fn generate_images(
        &self,
        options: &GenerationOptions,
    ) -> Result<Vec<ImagePayload>, ClientError> {
        if !self.is_configured() {
            return Err(ClientError::Configuration);
        }
        let request = ImageRequest {
            prompt: options.styled_prompt(),
            number_of_images: options.number_of_images(),
            aspect_ratio: options.aspect_ratio(),
            output_mime_type: OUTPUT_MIME_TYPE,
        };
        match self.transport.generate_images(&request) {
            Ok(images) if images.is_empty() => {
                log::error!("{} returned no images", self.transport.name());
                Err(ClientError::GenerationFailed)
            }
            Ok(images) => Ok(images),
            Err(err) => {
                log::error!("error generating images: {err:#}");
                Err(ClientError::GenerationFailed)
            }
        }
    }

    /// Blank input short-circuits to an empty suggestion without a call.
    pub fn improve_prompt(&self, prompt: &str) -> Result<String, ClientError> {
        if prompt.trim().is_empty() {
            return Ok(String::new());
        }
        let request = TextRequest {
            parts: vec![ContentPart::Text(format!("{IMPROVE_INSTRUCTION}\n\n{prompt}"))],
            sampling: SamplingConfig {
                thinking_budget: Some(0),
                ..SamplingConfig::default()
            },
        };
        self.prompt_action(PromptActionKind::Improve, &request)
            .map(|text| strip_wrapping_quotes(&text))
    }

    pub fn random_prompt(&self) -> Result<String, ClientError> {
        let request = TextRequest {
            parts: vec![ContentPart::Text(RANDOM_INSTRUCTION.to_string())],
            sampling: SamplingConfig {
                temperature: Some(1.2),
                top_p: Some(0.98),
                top_k: Some(40),
                thinking_budget: Some(0),
            },
        };
        self.prompt_action(PromptActionKind::Random, &request)
            .map(|text| strip_wrapping_quotes(&text))
    }

    pub fn describe_image(&self, base64: &str, mime_type: &str) -> Result<String, ClientError> {
        let request = TextRequest {
            parts: vec![
                ContentPart::InlineImage {
                    base64: base64.to_string(),
                    mime_type: mime_type.to_string(),
                },
                ContentPart::Text(DESCRIBE_INSTRUCTION.to_string()),
            ],
            sampling: SamplingConfig::default(),
        };
        self.prompt_action(PromptActionKind::Describe, &request)
    }

    fn prompt_action(
        &self,
        kind: PromptActionKind,
        request: &TextRequest,
    ) -> Result<String, ClientError> {
        if !self.is_configured() {
            return Err(ClientError::Configuration);
        }
        self.transport.generate_text(request).map_err(|err| {
            log::error!("prompt action '{kind}' failed: {err:#}");
            ClientError::PromptActionFailed(kind)
        })
    }
}

/// Trims whitespace, then drops one leading and one trailing `"`.
pub fn strip_wrapping_quotes(text: &str) -> String {
    static QUOTES: OnceLock<Regex> = OnceLock::new();
    let pattern = QUOTES.get_or_init(|| Regex::new(r#"^"|"$"#).expect("quote pattern is valid"));
    pattern.replace_all(text.trim(), "").into_owned()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Transport double that records requests and replays queued replies.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingTransport {
        pub configured: bool,
        pub image_requests: Arc<Mutex<Vec<ImageRequest>>>,
        pub text_requests: Arc<Mutex<Vec<TextRequest>>>,
        pub image_replies: Arc<Mutex<VecDeque<anyhow::Result<Vec<ImagePayload>>>>>,
        pub text_replies: Arc<Mutex<VecDeque<anyhow::Result<String>>>>,
    }

    impl RecordingTransport {
        pub fn configured() -> Self {
            Self {
                configured: true,
                ..Self::default()
            }
        }

        pub fn reply_images(&self, reply: anyhow::Result<Vec<ImagePayload>>) {
            self.image_replies.lock().unwrap().push_back(reply);
        }

        pub fn reply_text(&self, reply: anyhow::Result<String>) {
            self.text_replies.lock().unwrap().push_back(reply);
        }

        pub fn image_calls(&self) -> Vec<ImageRequest> {
            self.image_requests.lock().unwrap().clone()
        }

        pub fn text_calls(&self) -> Vec<TextRequest> {
            self.text_requests.lock().unwrap().clone()
        }
    }

    impl ModelTransport for RecordingTransport {
        fn name(&self) -> &str {
            "recording"
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        fn generate_images(&self, request: &ImageRequest) -> anyhow::Result<Vec<ImagePayload>> {
            self.image_requests.lock().unwrap().push(request.clone());
            self.image_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Ok((0..request.number_of_images)
                        .map(|idx| ImagePayload::from_bytes(format!("img-{idx}").as_bytes()))
                        .collect())
                })
        }

        fn generate_text(&self, request: &TextRequest) -> anyhow::Result<String> {
            self.text_requests.lock().unwrap().push(request.clone());
            self.text_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("a suggested prompt".to_string()))
        }
    }
}
