//! Generative AI provider
//!
//! [`AiProvider`] is the seam between the AI service and the outside world.
//! [`OpenAiCompatibleProvider`] speaks the OpenAI REST dialect, which most
//! hosted and self-hosted model servers accept.

use crate::config::AiConfig;
use crate::models::TokenUsage;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Text returned by a completion call
#[derive(Debug, Clone, PartialEq)]
pub struct TextGeneration {
    pub text: String,
    pub usage: TokenUsage,
}

/// Binary output of an image or speech call
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedMedia {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[async_trait]
pub trait AiProvider: Send + Sync {
    async fn generate_text(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<TextGeneration>;

    /// `size` is `WIDTHxHEIGHT`
    async fn generate_image(&self, model: &str, prompt: &str, size: &str) -> Result<GeneratedMedia>;

    async fn synthesize_speech(&self, model: &str, voice: &str, text: &str) -> Result<GeneratedMedia>;
}

pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: &AiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow!("AI API key is not configured"))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn post(&self, path: &str, payload: serde_json::Value) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        bail!("Provider returned HTTP {}: {}", status.as_u16(), provider_error_message(&body))
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
    #[serde(default)]
    total_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    b64_json: Option<String>,
}

#[async_trait]
impl AiProvider for OpenAiCompatibleProvider {
    async fn generate_text(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<TextGeneration> {
        let payload = json!({
            "model": model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt }
            ],
            "max_tokens": max_tokens
        });
        let completion: ChatCompletion = self
            .post("/chat/completions", payload)
            .await?
            .json()
            .await
            .context("Failed to parse completion response")?;
        parse_completion(completion)
    }

    async fn generate_image(&self, model: &str, prompt: &str, size: &str) -> Result<GeneratedMedia> {
        let payload = json!({
            "model": model,
            "prompt": prompt,
            "n": 1,
            "size": size,
            "response_format": "b64_json"
        });
        let response: ImageResponse = self
            .post("/images/generations", payload)
            .await?
            .json()
            .await
            .context("Failed to parse image response")?;
        decode_image(response)
    }

    async fn synthesize_speech(&self, model: &str, voice: &str, text: &str) -> Result<GeneratedMedia> {
        let payload = json!({
            "model": model,
            "voice": voice,
            "input": text,
            "response_format": "mp3"
        });
        let bytes = self
            .post("/audio/speech", payload)
            .await?
            .bytes()
            .await
            .context("Failed to read speech response")?;
        if bytes.is_empty() {
            bail!("Provider returned empty audio");
        }
        Ok(GeneratedMedia {
            bytes: bytes.to_vec(),
            mime_type: "audio/mpeg".to_string(),
        })
    }
}

fn parse_completion(completion: ChatCompletion) -> Result<TextGeneration> {
    let text = completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| anyhow!("Provider returned no text"))?;
    let usage = completion
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: if u.total_tokens > 0 {
                u.total_tokens
            } else {
                u.prompt_tokens + u.completion_tokens
            },
        })
        .unwrap_or_default();
    Ok(TextGeneration { text, usage })
}

fn decode_image(response: ImageResponse) -> Result<GeneratedMedia> {
    let encoded = response
        .data
        .into_iter()
        .next()
        .and_then(|d| d.b64_json)
        .ok_or_else(|| anyhow!("Provider returned no image data"))?;
    let bytes = data_encoding::BASE64
        .decode(encoded.trim().as_bytes())
        .context("Provider returned invalid base64 image data")?;
    Ok(GeneratedMedia {
        bytes,
        mime_type: "image/png".to_string(),
    })
}

/// Pull `error.message` out of an OpenAI style error body
fn provider_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}
