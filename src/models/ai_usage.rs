//! AI usage log model
//!
//! Every call to the generative AI provider leaves one row, whether it
//! succeeded or not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiKind {
    Text,
    Image,
    Audio,
}

impl AiKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiKind::Text => "text",
            AiKind::Image => "image",
            AiKind::Audio => "audio",
        }
    }
}

impl fmt::Display for AiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AiKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(AiKind::Text),
            "image" => Ok(AiKind::Image),
            "audio" => Ok(AiKind::Audio),
            _ => Err(anyhow::anyhow!("Invalid AI kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiCallStatus {
    Success,
    Error,
}

impl AiCallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiCallStatus::Success => "success",
            AiCallStatus::Error => "error",
        }
    }
}

impl FromStr for AiCallStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(AiCallStatus::Success),
            "error" => Ok(AiCallStatus::Error),
            _ => Err(anyhow::anyhow!("Invalid AI call status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiUsageLog {
    pub id: i64,
    pub user_id: Option<i64>,
    pub kind: AiKind,
    pub model: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub status: AiCallStatus,
    pub error_message: Option<String>,
    pub latency_ms: i64,
    pub created_at: DateTime<Utc>,
}

/// Token counts reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

#[derive(Debug, Clone)]
pub struct NewAiUsageLog {
    pub user_id: Option<i64>,
    pub kind: AiKind,
    pub model: String,
    pub usage: TokenUsage,
    pub status: AiCallStatus,
    pub error_message: Option<String>,
    pub latency_ms: i64,
}

/// Aggregate usage for one kind of call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiUsageSummary {
    pub kind: AiKind,
    pub calls: i64,
    pub errors: i64,
    pub total_tokens: i64,
}
