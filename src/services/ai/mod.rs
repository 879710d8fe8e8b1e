//! AI-assisted authoring
//!
//! Wraps an [`AiProvider`] with prompt validation, editor actions, media
//! storage for generated images and audio, and usage accounting. Every
//! call that reaches the provider leaves exactly one usage log row.

mod provider;

pub use provider::{AiProvider, GeneratedMedia, OpenAiCompatibleProvider, TextGeneration};

use crate::config::AiConfig;
use crate::db::repositories::AiUsageRepository;
use crate::models::{
    AiCallStatus, AiKind, AiUsageLog, AiUsageSummary, ListParams, MediaAsset, NewAiUsageLog,
    PagedResult, TokenUsage,
};
use crate::services::media::{MediaService, MediaServiceError};
use anyhow::Context;
use pulldown_cmark::{html, Event, Options, Parser};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Sizes accepted by the image endpoint
pub const IMAGE_SIZES: &[&str] = &["256x256", "512x512", "1024x1024", "1792x1024", "1024x1792"];
pub const DEFAULT_IMAGE_SIZE: &str = "1024x1024";
/// Longest input the speech endpoint accepts
pub const MAX_SPEECH_CHARS: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum AiServiceError {
    #[error("AI features are not configured")]
    NotConfigured,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("AI provider error: {0}")]
    ProviderError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<MediaServiceError> for AiServiceError {
    fn from(e: MediaServiceError) -> Self {
        match e {
            MediaServiceError::ValidationError(msg) => AiServiceError::ValidationError(msg),
            MediaServiceError::InternalError(e) => AiServiceError::InternalError(e),
            other => AiServiceError::InternalError(anyhow::anyhow!(other.to_string())),
        }
    }
}

/// What the editor wants done with the prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiAction {
    #[default]
    Generate,
    Improve,
    Summarize,
    Expand,
    Shorten,
    Translate,
}

impl AiAction {
    fn system_prompt(&self, language: Option<&str>) -> String {
        const BASE: &str = "You are a writing assistant for a knowledge base. \
            Reply in Markdown without any preamble.";
        let task = match self {
            AiAction::Generate => "Write a clear, well-structured article section about the topic given by the user.".to_string(),
            AiAction::Improve => "Improve the clarity, grammar and flow of the user's text while keeping its meaning.".to_string(),
            AiAction::Summarize => "Summarize the user's text in a short paragraph.".to_string(),
            AiAction::Expand => "Expand the user's text with more detail and examples.".to_string(),
            AiAction::Shorten => "Make the user's text more concise without losing key information.".to_string(),
            AiAction::Translate => format!(
                "Translate the user's text into {}. Keep formatting intact.",
                language.map(str::trim).filter(|l| !l.is_empty()).unwrap_or("English")
            ),
        };
        format!("{} {}", BASE, task)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextRequest {
    #[serde(default)]
    pub action: AiAction,
    pub prompt: String,
    /// Target language for `translate`
    #[serde(default)]
    pub language: Option<String>,
}

/// Generated text ready for the editor
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedText {
    pub markdown: String,
    pub html: String,
    pub model: String,
    pub usage: TokenUsage,
}

pub struct AiService {
    provider: Option<Arc<dyn AiProvider>>,
    config: AiConfig,
    usage_repo: Arc<dyn AiUsageRepository>,
    media: Arc<MediaService>,
}

impl AiService {
    pub fn new(
        provider: Option<Arc<dyn AiProvider>>,
        config: AiConfig,
        usage_repo: Arc<dyn AiUsageRepository>,
        media: Arc<MediaService>,
    ) -> Self {
        Self {
            provider,
            config,
            usage_repo,
            media,
        }
    }

    /// Build the service with an HTTP provider when an API key is configured
    pub fn from_config(
        config: AiConfig,
        usage_repo: Arc<dyn AiUsageRepository>,
        media: Arc<MediaService>,
    ) -> anyhow::Result<Self> {
        let provider: Option<Arc<dyn AiProvider>> = if config.is_configured() {
            Some(Arc::new(OpenAiCompatibleProvider::new(&config)?))
        } else {
            tracing::info!("No AI API key configured; AI features disabled");
            None
        };
        Ok(Self::new(provider, config, usage_repo, media))
    }

    pub fn is_available(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn generate_text(
        &self,
        request: TextRequest,
        user_id: Option<i64>,
    ) -> Result<GeneratedText, AiServiceError> {
        let provider = self.provider()?;
        let prompt = self.check_prompt(&request.prompt, self.config.max_prompt_chars)?;
        let system = request.action.system_prompt(request.language.as_deref());
        let model = self.config.text_model.clone();

        let started = Instant::now();
        let result = provider
            .generate_text(&model, &system, prompt, self.config.max_tokens)
            .await;
        let usage = result.as_ref().map(|g| g.usage).unwrap_or_default();
        self.record(AiKind::Text, &model, usage, result.as_ref().err(), started, user_id)
            .await;

        let generation = result.map_err(|e| AiServiceError::ProviderError(format!("{:#}", e)))?;
        Ok(GeneratedText {
            html: markdown_to_html(&generation.text),
            markdown: generation.text,
            model,
            usage,
        })
    }

    /// Generate an image and add it to the media library
    pub async fn generate_image(
        &self,
        prompt: &str,
        size: Option<&str>,
        user_id: Option<i64>,
    ) -> Result<MediaAsset, AiServiceError> {
        let provider = self.provider()?;
        let prompt = self.check_prompt(prompt, self.config.max_prompt_chars)?;
        let size = size.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(DEFAULT_IMAGE_SIZE);
        if !IMAGE_SIZES.contains(&size) {
            return Err(AiServiceError::ValidationError(format!(
                "Unsupported image size {}; expected one of {}",
                size,
                IMAGE_SIZES.join(", ")
            )));
        }
        let model = self.config.image_model.clone();

        let started = Instant::now();
        let result = provider.generate_image(&model, prompt, size).await;
        self.store_output(AiKind::Image, &model, result, prompt, started, user_id)
            .await
    }

    /// Read text aloud and add the audio to the media library
    pub async fn synthesize_speech(
        &self,
        text: &str,
        voice: Option<&str>,
        user_id: Option<i64>,
    ) -> Result<MediaAsset, AiServiceError> {
        let provider = self.provider()?;
        let text = self.check_prompt(text, self.config.max_prompt_chars.min(MAX_SPEECH_CHARS))?;
        let voice = voice
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(self.config.voice.as_str())
            .to_string();
        let model = self.config.speech_model.clone();

        let started = Instant::now();
        let result = provider.synthesize_speech(&model, &voice, text).await;
        self.store_output(AiKind::Audio, &model, result, text, started, user_id)
            .await
    }

    pub async fn usage(
        &self,
        kind: Option<AiKind>,
        params: &ListParams,
    ) -> Result<PagedResult<AiUsageLog>, AiServiceError> {
        let items = self.usage_repo.list(kind, params).await.context("Failed to list AI usage")?;
        let total = self.usage_repo.count(kind).await.context("Failed to count AI usage")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn usage_summary(&self) -> Result<Vec<AiUsageSummary>, AiServiceError> {
        Ok(self
            .usage_repo
            .summary()
            .await
            .context("Failed to summarize AI usage")?)
    }

    fn provider(&self) -> Result<&Arc<dyn AiProvider>, AiServiceError> {
        self.provider.as_ref().ok_or(AiServiceError::NotConfigured)
    }

    fn check_prompt<'a>(&self, prompt: &'a str, max_chars: usize) -> Result<&'a str, AiServiceError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(AiServiceError::ValidationError("Prompt cannot be empty".to_string()));
        }
        if prompt.chars().count() > max_chars {
            return Err(AiServiceError::ValidationError(format!(
                "Prompt cannot exceed {} characters",
                max_chars
            )));
        }
        Ok(prompt)
    }

    /// Save provider output to the media library, then log the call
    ///
    /// A storage failure is logged as an error of the call.
    async fn store_output(
        &self,
        kind: AiKind,
        model: &str,
        result: anyhow::Result<GeneratedMedia>,
        prompt: &str,
        started: Instant,
        user_id: Option<i64>,
    ) -> Result<MediaAsset, AiServiceError> {
        let media = match result {
            Ok(media) => media,
            Err(e) => {
                self.record(kind, model, TokenUsage::default(), Some(&e), started, user_id)
                    .await;
                return Err(AiServiceError::ProviderError(format!("{:#}", e)));
            }
        };

        match self
            .media
            .store_generated(&media.bytes, &media.mime_type, prompt, user_id)
            .await
        {
            Ok(asset) => {
                self.record(kind, model, TokenUsage::default(), None, started, user_id)
                    .await;
                Ok(asset)
            }
            Err(e) => {
                let failure = anyhow::anyhow!("Failed to store generated {}: {}", kind, e);
                self.record(kind, model, TokenUsage::default(), Some(&failure), started, user_id)
                    .await;
                Err(e.into())
            }
        }
    }

    /// Write the usage row; a logging failure never fails the call
    async fn record(
        &self,
        kind: AiKind,
        model: &str,
        usage: TokenUsage,
        error: Option<&anyhow::Error>,
        started: Instant,
        user_id: Option<i64>,
    ) {
        let latency_ms = started.elapsed().as_millis() as i64;
        let status = if error.is_some() {
            AiCallStatus::Error
        } else {
            AiCallStatus::Success
        };
        match error {
            Some(e) => tracing::warn!(kind = %kind, model, latency_ms, "AI call failed: {:#}", e),
            None => tracing::info!(kind = %kind, model, latency_ms, tokens = usage.total_tokens, "AI call succeeded"),
        }

        let entry = NewAiUsageLog {
            user_id,
            kind,
            model: model.to_string(),
            usage,
            status,
            error_message: error.map(|e| format!("{:#}", e)),
            latency_ms,
        };
        if let Err(e) = self.usage_repo.insert(&entry).await {
            tracing::error!("Failed to record AI usage: {:#}", e);
        }
    }
}

/// Render generated Markdown for the editor
///
/// Raw HTML in the model output is escaped rather than passed through.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let events = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut output = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut output, events);
    output
}
