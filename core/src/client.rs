use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_VISION_MODEL: &str = "gpt-4o";
const DEFAULT_TEXT_MODEL: &str = "gpt-4";
const MAX_TOKENS: u32 = 500;

/// Model access as an explicit capability: constructed once at process start
/// and threaded into the components that need it, so tests can substitute a
/// fake without touching global state.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// One text-only completion round trip.
    async fn complete_text(&self, prompt: &str) -> Result<String>;

    /// One multimodal round trip: the prompt plus an inlined image payload.
    async fn complete_vision(&self, prompt: &str, image: &[u8]) -> Result<String>;
}

/// Client for OpenAI-compatible Chat Completions endpoints.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    vision_model: String,
    text_model: String,
}

impl OpenAiClient {
    pub fn new(api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
        })
    }

    /// Build a client from environment: `OPENAI_API_KEY` (required), with
    /// `OPENAI_BASE_URL`, `OPENAI_VISION_MODEL` and `OPENAI_TEXT_MODEL`
    /// overriding the defaults.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY is not set"))?;
        let mut client = Self::new(api_key)?;
        if let Ok(base) = std::env::var("OPENAI_BASE_URL") {
            client.base_url = base.trim_end_matches('/').to_string();
        }
        if let Ok(model) = std::env::var("OPENAI_VISION_MODEL") {
            client.vision_model = model;
        }
        if let Ok(model) = std::env::var("OPENAI_TEXT_MODEL") {
            client.text_model = model;
        }
        Ok(client)
    }

    async fn chat(&self, model: &str, content: serde_json::Value) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": model,
            "messages": [{ "role": "user", "content": content }],
            "max_tokens": MAX_TOKENS,
        });

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("model endpoint returned {status}: {text}"));
        }

        let parsed: ChatResponse = resp.json().await?;
        let reply = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("model response contained no choices"))?;
        Ok(reply)
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete_text(&self, prompt: &str) -> Result<String> {
        self.chat(&self.text_model, serde_json::json!(prompt)).await
    }

    async fn complete_vision(&self, prompt: &str, image: &[u8]) -> Result<String> {
        let content = serde_json::json!([
            { "type": "text", "text": prompt },
            { "type": "image_url", "image_url": { "url": image_data_url(image) } }
        ]);
        self.chat(&self.vision_model, content).await
    }
}

/// Inline image bytes as a `data:` URL, tagged with a sniffed MIME type.
fn image_data_url(bytes: &[u8]) -> String {
    let mime = infer::get(bytes).map(|t| t.mime_type()).unwrap_or("image/jpeg");
    let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{mime};base64,{b64}")
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_tags_png_mime() {
        // Minimal PNG magic bytes are enough for sniffing.
        let bytes = [0x89u8, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0];
        let url = image_data_url(&bytes);
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn data_url_falls_back_to_jpeg() {
        let url = image_data_url(b"definitely not an image");
        assert!(url.starts_with("data:image/jpeg;base64,"));
    }
}
