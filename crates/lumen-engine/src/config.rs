use std::env;

use crate::client::{DryrunTransport, GeminiTransport, GenerationClient};

pub const API_KEY_VARS: [&str; 3] = ["API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"];
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-4.0-generate-001";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";

/// Remote service settings resolved from the process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub image_model: String,
    pub text_model: String,
    pub dryrun: bool,
}

impl ClientConfig {
    pub fn from_env(dryrun: bool) -> Self {
        Self::from_lookup(dryrun, |key| env::var(key).ok())
    }

    pub fn from_lookup(dryrun: bool, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let first = |keys: &[&str]| first_non_empty(keys, &lookup);
        Self {
            api_key: first(&API_KEY_VARS),
            api_base: first(&["GEMINI_API_BASE"])
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            image_model: first(&["LUMEN_IMAGE_MODEL"])
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            text_model: first(&["LUMEN_TEXT_MODEL"])
                .unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            dryrun,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.dryrun || self.api_key.is_some()
    }

    pub fn build_client(&self) -> GenerationClient {
        if self.dryrun {
            log::info!("using dryrun transport");
            return GenerationClient::new(DryrunTransport::new());
        }
        if self.api_key.is_none() {
            log::warn!("no API key found in {}", API_KEY_VARS.join(", "));
        }
        GenerationClient::new(GeminiTransport::new(
            self.api_base.clone(),
            self.api_key.clone(),
            self.image_model.clone(),
            self.text_model.clone(),
        ))
    }
}

fn first_non_empty(keys: &[&str], lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    keys.iter().find_map(|key| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
