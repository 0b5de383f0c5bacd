use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{json, Value};
use sketchcalc_core::{agent::VisionBackend, config::DEFAULT_GEMINI_BASE_URL, Image};
use tracing::{info, warn};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Calls Google's Generative Language API (`models/{model}:generateContent`)
/// with the prompt and the image as inline data.
pub struct GeminiBackend {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    http: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_GEMINI_BASE_URL.into(),
            timeout_secs: 120,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

pub(crate) fn request_body(prompt: &str, image: &Image) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [
                { "text": prompt },
                { "inlineData": { "mimeType": image.mime_type, "data": STANDARD.encode(&image.bytes) } }
            ]
        }]
    })
}

/// Concatenate the text parts of the first candidate. Empty when the model
/// returned no candidate (e.g. a safety block).
pub(crate) fn extract_text(resp: &Value) -> String {
    resp["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}

#[async_trait]
impl VisionBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str, image: &Image) -> Result<String> {
        info!(
            model = %self.model,
            image_bytes = image.bytes.len(),
            "calling gemini generateContent"
        );

        let resp = self
            .http
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .json(&request_body(prompt, image))
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("failed to send gemini request")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("gemini error {}: {}", status, body);
        }

        let json: Value = resp
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .context("failed to parse gemini response")?;
        let text = extract_text(&json);

        if text.is_empty() {
            warn!(
                model = %self.model,
                block_reason = json["promptFeedback"]["blockReason"].as_str().unwrap_or(""),
                finish_reason = json["candidates"][0]["finishReason"].as_str().unwrap_or(""),
                "gemini returned no text"
            );
        }
        info!(model = %self.model, output_len = text.len(), "gemini response received");

        Ok(text)
    }
}
