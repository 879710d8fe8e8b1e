//! Media library model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An uploaded or generated file served from `/uploads`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaAsset {
    pub id: i64,
    /// Stored file name inside the upload directory (unique)
    pub filename: String,
    pub original_name: String,
    pub url: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub alt_text: String,
    pub source: MediaSource,
    pub uploaded_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl MediaAsset {
    pub fn kind(&self) -> MediaKind {
        MediaKind::from_mime(&self.mime_type)
    }
}

/// How an asset entered the library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaSource {
    #[default]
    Upload,
    Ai,
}

impl MediaSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaSource::Upload => "upload",
            MediaSource::Ai => "ai",
        }
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(MediaSource::Upload),
            "ai" => Ok(MediaSource::Ai),
            _ => Err(anyhow::anyhow!("Invalid media source: {}", s)),
        }
    }
}

/// Coarse media type used for library filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
    Other,
}

impl MediaKind {
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            MediaKind::Image
        } else if mime.starts_with("audio/") {
            MediaKind::Audio
        } else {
            MediaKind::Other
        }
    }

    /// `LIKE` pattern matching this kind's MIME types
    pub fn mime_pattern(&self) -> &'static str {
        match self {
            MediaKind::Image => "image/%",
            MediaKind::Audio => "audio/%",
            MediaKind::Other => "%",
        }
    }
}

impl FromStr for MediaKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(MediaKind::Image),
            "audio" => Ok(MediaKind::Audio),
            "other" => Ok(MediaKind::Other),
            _ => Err(anyhow::anyhow!("Invalid media kind: {}", s)),
        }
    }
}

/// Row to insert after the file has been written
#[derive(Debug, Clone)]
pub struct NewMediaAsset {
    pub filename: String,
    pub original_name: String,
    pub url: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub alt_text: String,
    pub source: MediaSource,
    pub uploaded_by: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_mime() {
        assert_eq!(MediaKind::from_mime("image/png"), MediaKind::Image);
        assert_eq!(MediaKind::from_mime("audio/mpeg"), MediaKind::Audio);
        assert_eq!(MediaKind::from_mime("application/pdf"), MediaKind::Other);
    }

    #[test]
    fn test_source_roundtrip() {
        assert_eq!("ai".parse::<MediaSource>().unwrap(), MediaSource::Ai);
        assert!("camera".parse::<MediaSource>().is_err());
    }
}
