use std::time::Duration;

use anyhow::{bail, Context, Result};
use lumen_contracts::history::ImagePayload;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};

use super::{ContentPart, ImageRequest, ModelTransport, SamplingConfig, TextRequest};

const REQUEST_TIMEOUT_S: f64 = 120.0;
const ERROR_BODY_MAX_CHARS: usize = 512;

/// Imagen `:predict` for images and Gemini `:generateContent` for text,
/// both keyed with `?key=`.
pub struct GeminiTransport {
    api_base: String,
    api_key: Option<String>,
    image_model: String,
    text_model: String,
    http: HttpClient,
}

impl GeminiTransport {
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        image_model: impl Into<String>,
        text_model: impl Into<String>,
    ) -> Self {
        Self {
            api_base: api_base.into().trim().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            image_model: resolve_model_name(&image_model.into()),
            text_model: resolve_model_name(&text_model.into()),
            http: HttpClient::new(),
        }
    }

    fn require_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) => Ok(key),
            None => bail!("API_KEY, GEMINI_API_KEY, or GOOGLE_API_KEY not set"),
        }
    }

    fn post(&self, provider: &str, endpoint: &str, payload: &Value) -> Result<Value> {
        let api_key = self.require_key()?;
        log::debug!("{provider} POST {endpoint}");
        let response = self
            .http
            .post(endpoint)
            .query(&[("key", api_key)])
            .timeout(Duration::from_secs_f64(REQUEST_TIMEOUT_S))
            .json(payload)
            .send()
            .with_context(|| format!("{provider} request failed ({endpoint})"))?;
        response_json_or_error(provider, response)
    }
}

impl ModelTransport for GeminiTransport {
    fn name(&self) -> &str {
        "gemini"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn generate_images(&self, request: &ImageRequest) -> Result<Vec<ImagePayload>> {
        let endpoint = format!("{}/models/{}:predict", self.api_base, self.image_model);
        let payload = imagen_payload(request);
        let response_payload = self.post("Imagen", &endpoint, &payload)?;
        let mut images = extract_predictions(&response_payload);
        if images.is_empty() {
            bail!("Imagen returned no images");
        }
        images.truncate(request.number_of_images.max(1) as usize);
        Ok(images)
    }

    fn generate_text(&self, request: &TextRequest) -> Result<String> {
        let endpoint = format!(
            "{}/models/{}:generateContent",
            self.api_base, self.text_model
        );
        let payload = generate_content_payload(request);
        let response_payload = self.post("Gemini", &endpoint, &payload)?;
        match extract_text(&response_payload) {
            Some(text) => Ok(text),
            None => bail!("Gemini returned no text candidates"),
        }
    }
}

fn resolve_model_name(raw_model: &str) -> String {
    raw_model.trim().trim_start_matches("models/").to_string()
}

fn imagen_payload(request: &ImageRequest) -> Value {
    json!({
        "instances": [{
            "prompt": request.prompt,
        }],
        "parameters": {
            "sampleCount": request.number_of_images,
            "aspectRatio": request.aspect_ratio.as_str(),
            "outputOptions": {
                "mimeType": request.output_mime_type,
            },
        },
    })
}

fn generate_content_payload(request: &TextRequest) -> Value {
    let parts: Vec<Value> = request
        .parts
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => json!({ "text": text }),
            ContentPart::InlineImage { base64, mime_type } => json!({
                "inlineData": {
                    "mimeType": mime_type,
                    "data": base64,
                }
            }),
        })
        .collect();

    let mut payload = Map::new();
    payload.insert(
        "contents".to_string(),
        json!([{ "role": "user", "parts": parts }]),
    );
    let generation_config = generation_config(&request.sampling);
    if !generation_config.is_empty() {
        payload.insert(
            "generationConfig".to_string(),
            Value::Object(generation_config),
        );
    }
    Value::Object(payload)
}

fn generation_config(sampling: &SamplingConfig) -> Map<String, Value> {
    let mut config = Map::new();
    if let Some(temperature) = sampling.temperature {
        config.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(top_p) = sampling.top_p {
        config.insert("topP".to_string(), json!(top_p));
    }
    if let Some(top_k) = sampling.top_k {
        config.insert("topK".to_string(), json!(top_k));
    }
    if let Some(budget) = sampling.thinking_budget {
        config.insert(
            "thinkingConfig".to_string(),
            json!({ "thinkingBudget": budget }),
        );
    }
    config
}

fn extract_predictions(response_payload: &Value) -> Vec<ImagePayload> {
    let predictions = response_payload
        .get("predictions")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut out = Vec::new();
    for row in predictions {
        let Some(obj) = row.as_object() else {
            continue;
        };
        let encoded = obj
            .get("bytesBase64Encoded")
            .or_else(|| obj.get("bytes_base64_encoded"))
            .and_then(Value::as_str)
            .or_else(|| {
                obj.get("image")
                    .or_else(|| obj.get("generatedImage"))
                    .and_then(Value::as_object)
                    .and_then(|generated| {
                        generated
                            .get("imageBytes")
                            .or_else(|| generated.get("bytesBase64Encoded"))
                    })
                    .and_then(Value::as_str)
            });
        if let Some(encoded) = encoded.filter(|value| !value.is_empty()) {
            out.push(ImagePayload::from_base64(encoded));
        }
    }
    out
}

/// Concatenated text parts of the first candidate.
fn extract_text(response_payload: &Value) -> Option<String> {
    let parts = response_payload
        .get("candidates")
        .and_then(Value::as_array)?
        .first()?
        .get("content")
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)?;
    let text: String = parts
        .iter()
        .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, ERROR_BODY_MAX_CHARS)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use lumen_contracts::options::AspectRatio;
    use serde_json::json;

    use super::*;

    #[test]
    fn imagen_payload_matches_predict_schema() {
        let payload = imagen_payload(&ImageRequest {
            prompt: "a red fox, vibrant anime style, detailed illustration".to_string(),
            number_of_images: 2,
            aspect_ratio: AspectRatio::Landscape,
            output_mime_type: "image/jpeg",
        });
        assert_eq!(
            payload,
            json!({
                "instances": [{"prompt": "a red fox, vibrant anime style, detailed illustration"}],
                "parameters": {
                    "sampleCount": 2,
                    "aspectRatio": "16:9",
                    "outputOptions": {"mimeType": "image/jpeg"},
                },
            })
        );
    }

    #[test]
    fn generate_content_payload_orders_parts_and_sampling() {
        let payload = generate_content_payload(&TextRequest {
            parts: vec![
                ContentPart::InlineImage {
                    base64: "AAAA".to_string(),
                    mime_type: "image/png".to_string(),
                },
                ContentPart::Text("describe".to_string()),
            ],
            sampling: SamplingConfig {
                temperature: Some(1.2),
                top_p: Some(0.98),
                top_k: Some(40),
                thinking_budget: Some(0),
            },
        });
        let parts = &payload["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], json!("image/png"));
        assert_eq!(parts[0]["inlineData"]["data"], json!("AAAA"));
        assert_eq!(parts[1]["text"], json!("describe"));
        let config = &payload["generationConfig"];
        assert_eq!(config["temperature"], json!(1.2));
        assert_eq!(config["topP"], json!(0.98));
        assert_eq!(config["topK"], json!(40));
        assert_eq!(config["thinkingConfig"]["thinkingBudget"], json!(0));
    }

    #[test]
    fn default_sampling_omits_generation_config() {
        let payload = generate_content_payload(&TextRequest {
            parts: vec![ContentPart::Text("hi".to_string())],
            sampling: SamplingConfig::default(),
        });
        assert!(payload.get("generationConfig").is_none());
    }

    #[test]
    fn extract_predictions_reads_both_shapes() {
        let payload = json!({
            "predictions": [
                {"bytesBase64Encoded": "QUJD", "mimeType": "image/jpeg"},
                {"image": {"imageBytes": "REVG"}},
                {"raiFilteredReason": "blocked"},
                "not-an-object",
            ]
        });
        let images = extract_predictions(&payload);
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].as_base64(), "QUJD");
        assert_eq!(images[1].as_base64(), "REVG");
        assert!(extract_predictions(&json!({})).is_empty());
    }

    #[test]
    fn extract_text_joins_parts_and_skips_thoughts() {
        let payload = json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "thinking...", "thought": true},
                    {"text": "a fox "},
                    {"text": "at dawn"},
                ]}
            }]
        });
        assert_eq!(extract_text(&payload).as_deref(), Some("a fox at dawn"));
        assert_eq!(extract_text(&json!({"candidates": []})), None);
    }

    #[test]
    fn missing_key_is_not_configured() {
        let transport = GeminiTransport::new(
            "https://example.invalid/v1beta/",
            Some("  ".to_string()),
            "models/imagen-4.0-generate-001",
            "gemini-2.5-flash",
        );
        assert!(!transport.is_configured());
        assert_eq!(transport.api_base, "https://example.invalid/v1beta");
        assert_eq!(transport.image_model, "imagen-4.0-generate-001");
        assert!(transport.require_key().is_err());
    }

    #[test]
    fn truncate_text_marks_cut() {
        assert_eq!(truncate_text("abc", 5), "abc");
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }
}
