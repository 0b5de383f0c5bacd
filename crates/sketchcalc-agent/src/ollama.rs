use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use sketchcalc_core::{agent::VisionBackend, Image};
use tracing::{info, warn};

/// Calls a locally-hosted Ollama vision model (llava, llama3.2-vision, ...)
/// via its native chat API.
///
/// For setups where sketches must not leave the machine. Output quality
/// depends heavily on the model; the normalizer copes with whatever comes back.
pub struct OllamaBackend {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            timeout_secs: 300,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[derive(Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
    /// Base64-encoded images, no data-URL prefix.
    images: Vec<String>,
}

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

fn chat_request(model: &str, prompt: &str, image: &Image) -> OllamaChatRequest {
    OllamaChatRequest {
        model: model.to_string(),
        messages: vec![OllamaMessage {
            role: "user".into(),
            content: prompt.to_string(),
            images: vec![STANDARD.encode(&image.bytes)],
        }],
        stream: false,
    }
}

#[async_trait]
impl VisionBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, prompt: &str, image: &Image) -> Result<String> {
        info!(
            model = %self.model,
            base_url = %self.base_url,
            image_bytes = image.bytes.len(),
            "calling ollama chat API"
        );

        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .build()?;

        let response = match client
            .post(&url)
            .json(&chat_request(&self.model, prompt, image))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                warn!(timeout_secs = self.timeout_secs, "ollama request timed out");
                bail!("ollama request timed out after {}s", self.timeout_secs);
            },
            Err(e) => return Err(e).context("ollama request failed"),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "ollama returned non-200: {}", body);
            bail!("ollama error {}: {}", status, body);
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .context("failed to parse ollama response")?;
        let output = parsed.message.content;

        info!(model = %self.model, output_len = output.len(), "ollama response received");

        Ok(output)
    }
}
