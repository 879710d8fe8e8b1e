//! Media library service
//!
//! Files are written to the configured upload directory under a random
//! uuid name and served from `/uploads/<filename>`. The database row is the
//! source of truth for what the library contains.

use crate::config::UploadConfig;
use crate::db::repositories::MediaRepository;
use crate::models::{ListParams, MediaAsset, MediaKind, MediaSource, NewMediaAsset, PagedResult};
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use uuid::Uuid;

pub const MAX_ALT_TEXT_LENGTH: usize = 255;

const UPLOAD_URL_PREFIX: &str = "/uploads/";

#[derive(Debug, thiserror::Error)]
pub enum MediaServiceError {
    #[error("Media asset not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct MediaService {
    repo: Arc<dyn MediaRepository>,
    config: UploadConfig,
}

impl MediaService {
    pub fn new(repo: Arc<dyn MediaRepository>, config: UploadConfig) -> Self {
        Self { repo, config }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.config.path
    }

    pub fn max_file_size(&self) -> u64 {
        self.config.max_file_size
    }

    /// Validate and store an uploaded file
    ///
    /// A generic or missing content type is replaced by a guess from the
    /// file name before the allow-list check.
    pub async fn store_upload(
        &self,
        bytes: &[u8],
        original_name: &str,
        mime_type: &str,
        alt_text: &str,
        uploaded_by: Option<i64>,
    ) -> Result<MediaAsset, MediaServiceError> {
        let mime_type = effective_mime(original_name, mime_type);
        if !self.config.is_type_allowed(&mime_type) {
            return Err(MediaServiceError::ValidationError(format!(
                "File type not allowed: {}",
                mime_type
            )));
        }
        self.store(bytes, original_name, &mime_type, alt_text, MediaSource::Upload, uploaded_by)
            .await
    }

    /// Store generated output; the prompt becomes the alt text
    pub async fn store_generated(
        &self,
        bytes: &[u8],
        mime_type: &str,
        prompt: &str,
        uploaded_by: Option<i64>,
    ) -> Result<MediaAsset, MediaServiceError> {
        let ext = self.config.extension_for(None, mime_type);
        let original_name = format!("generated.{}", ext);
        self.store(bytes, &original_name, mime_type, prompt, MediaSource::Ai, uploaded_by)
            .await
    }

    async fn store(
        &self,
        bytes: &[u8],
        original_name: &str,
        mime_type: &str,
        alt_text: &str,
        source: MediaSource,
        uploaded_by: Option<i64>,
    ) -> Result<MediaAsset, MediaServiceError> {
        if bytes.is_empty() {
            return Err(MediaServiceError::ValidationError("File is empty".to_string()));
        }
        if bytes.len() as u64 > self.config.max_file_size {
            return Err(MediaServiceError::ValidationError(format!(
                "File too large. Maximum size: {} MB",
                self.config.max_file_size / 1024 / 1024
            )));
        }

        let (width, height) = match image_dimensions(bytes) {
            Some((w, h)) => (i32::try_from(w).ok(), i32::try_from(h).ok()),
            None => (None, None),
        };

        let ext = self.config.extension_for(Some(original_name), mime_type);
        let filename = format!("{}.{}", Uuid::new_v4(), ext);
        fs::create_dir_all(&self.config.path)
            .await
            .with_context(|| format!("Failed to create upload dir {}", self.config.path.display()))?;
        let file_path = self.config.path.join(&filename);
        fs::write(&file_path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", file_path.display()))?;

        let record = NewMediaAsset {
            url: format!("{}{}", UPLOAD_URL_PREFIX, filename),
            filename,
            original_name: sanitize_original_name(original_name),
            mime_type: mime_type.to_string(),
            size_bytes: bytes.len() as i64,
            width,
            height,
            alt_text: truncate_chars(alt_text.trim(), MAX_ALT_TEXT_LENGTH),
            source,
            uploaded_by,
        };

        match self.repo.create(&record).await {
            Ok(asset) => {
                tracing::info!(
                    "Stored media {} ({}, {} bytes, source {})",
                    asset.filename,
                    asset.mime_type,
                    asset.size_bytes,
                    asset.source
                );
                Ok(asset)
            }
            Err(e) => {
                // Do not leave an orphan file behind
                if let Err(remove_err) = fs::remove_file(&file_path).await {
                    tracing::warn!("Failed to remove {}: {}", file_path.display(), remove_err);
                }
                Err(MediaServiceError::InternalError(e.context("Failed to record media asset")))
            }
        }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<MediaAsset, MediaServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get media asset")?
            .ok_or(MediaServiceError::NotFound(id))
    }

    pub async fn list(
        &self,
        kind: Option<MediaKind>,
        params: &ListParams,
    ) -> Result<PagedResult<MediaAsset>, MediaServiceError> {
        let items = self.repo.list(kind, params).await.context("Failed to list media")?;
        let total = self.repo.count(kind).await.context("Failed to count media")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn count(&self) -> Result<i64, MediaServiceError> {
        Ok(self.repo.count(None).await.context("Failed to count media")?)
    }

    pub async fn update_alt_text(&self, id: i64, alt_text: &str) -> Result<MediaAsset, MediaServiceError> {
        let alt_text = alt_text.trim();
        if alt_text.chars().count() > MAX_ALT_TEXT_LENGTH {
            return Err(MediaServiceError::ValidationError(format!(
                "Alt text cannot exceed {} characters",
                MAX_ALT_TEXT_LENGTH
            )));
        }
        self.repo
            .update_alt_text(id, alt_text)
            .await
            .context("Failed to update alt text")?
            .ok_or(MediaServiceError::NotFound(id))
    }

    /// Remove the row, then the file
    ///
    /// A file already missing from disk is only logged.
    pub async fn delete(&self, id: i64) -> Result<(), MediaServiceError> {
        let asset = self.get_by_id(id).await?;
        if !self.repo.delete(id).await.context("Failed to delete media asset")? {
            return Err(MediaServiceError::NotFound(id));
        }

        let file_path = self.config.path.join(&asset.filename);
        match fs::remove_file(&file_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Media file already gone: {}", file_path.display());
            }
            Err(e) => {
                return Err(MediaServiceError::InternalError(
                    anyhow::Error::new(e).context(format!("Failed to remove {}", file_path.display())),
                ))
            }
        }
        tracing::info!("Deleted media {}", asset.filename);
        Ok(())
    }
}

fn effective_mime(original_name: &str, mime_type: &str) -> String {
    let mime_type = mime_type.trim().to_ascii_lowercase();
    if mime_type.is_empty() || mime_type == "application/octet-stream" {
        return mime_guess::from_path(original_name)
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or(mime_type);
    }
    mime_type
}

fn sanitize_original_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    let base = if base.is_empty() { "file" } else { base };
    truncate_chars(base, MAX_ALT_TEXT_LENGTH)
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Read pixel dimensions from PNG, JPEG, GIF or WebP headers
pub fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return png_dimensions(bytes);
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        let b = bytes.get(6..10)?;
        return Some((
            u16::from_le_bytes([b[0], b[1]]) as u32,
            u16::from_le_bytes([b[2], b[3]]) as u32,
        ));
    }
    if bytes.starts_with(&[0xFF, 0xD8]) {
        return jpeg_dimensions(bytes);
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return webp_dimensions(bytes);
    }
    None
}

fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.get(12..16)? != b"IHDR" {
        return None;
    }
    let b = bytes.get(16..24)?;
    Some((
        u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        u32::from_be_bytes([b[4], b[5], b[6], b[7]]),
    ))
}

fn jpeg_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let mut pos = 2;
    loop {
        // Skip fill bytes before the marker code
        while *bytes.get(pos)? == 0xFF && *bytes.get(pos + 1)? == 0xFF {
            pos += 1;
        }
        if *bytes.get(pos)? != 0xFF {
            return None;
        }
        let marker = *bytes.get(pos + 1)?;
        pos += 2;

        match marker {
            0xD8 | 0x01 | 0xD0..=0xD7 => continue,
            0xD9 | 0xDA => return None,
            _ => {}
        }

        let len = u16::from_be_bytes([*bytes.get(pos)?, *bytes.get(pos + 1)?]) as usize;
        if len < 2 {
            return None;
        }
        let is_sof = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            let b = bytes.get(pos + 3..pos + 7)?;
            let height = u16::from_be_bytes([b[0], b[1]]) as u32;
            let width = u16::from_be_bytes([b[2], b[3]]) as u32;
            return Some((width, height));
        }
        pos += len;
    }
}

fn webp_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let chunk = bytes.get(12..16)?;
    match chunk {
        b"VP8 " => {
            if bytes.get(23..26)? != [0x9D, 0x01, 0x2A] {
                return None;
            }
            let b = bytes.get(26..30)?;
            Some((
                (u16::from_le_bytes([b[0], b[1]]) & 0x3FFF) as u32,
                (u16::from_le_bytes([b[2], b[3]]) & 0x3FFF) as u32,
            ))
        }
        b"VP8L" => {
            if *bytes.get(20)? != 0x2F {
                return None;
            }
            let b = bytes.get(21..25)?;
            let bits = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            Some(((bits & 0x3FFF) + 1, ((bits >> 14) & 0x3FFF) + 1))
        }
        b"VP8X" => {
            let b = bytes.get(24..30)?;
            let width = u32::from_le_bytes([b[0], b[1], b[2], 0]) + 1;
            let height = u32::from_le_bytes([b[3], b[4], b[5], 0]) + 1;
            Some((width, height))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxMediaRepository;
    use crate::db::{create_test_pool, migrations::run_migrations};
    use tempfile::TempDir;

    fn png_header(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
        bytes
    }

    async fn setup_test_service(max_file_size: u64) -> (MediaService, TempDir) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = UploadConfig {
            path: dir.path().join("uploads"),
            max_file_size,
            ..UploadConfig::default()
        };
        (MediaService::new(SqlxMediaRepository::boxed(pool), config), dir)
    }

    #[test]
    fn test_png_and_gif_dimensions() {
        assert_eq!(image_dimensions(&png_header(640, 480)), Some((640, 480)));

        let mut gif = b"GIF89a".to_vec();
        gif.extend_from_slice(&[0x20, 0x01, 0x10, 0x00]);
        assert_eq!(image_dimensions(&gif), Some((288, 16)));
    }

    #[test]
    fn test_jpeg_dimensions_skip_app_segments() {
        let mut jpeg = vec![0xFF, 0xD8];
        // APP0 with a 4 byte payload
        jpeg.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x06, b'J', b'F', b'I', b'F']);
        // SOF0: length, precision, height 0x0100, width 0x0200
        jpeg.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08, 0x01, 0x00, 0x02, 0x00]);
        assert_eq!(image_dimensions(&jpeg), Some((512, 256)));

        assert_eq!(image_dimensions(&[0xFF, 0xD8, 0xFF, 0xD9]), None);
    }

    #[test]
    fn test_webp_dimensions() {
        let mut vp8x = b"RIFF\0\0\0\0WEBPVP8X".to_vec();
        vp8x.extend_from_slice(&[0; 8]);
        vp8x.extend_from_slice(&[0x7F, 0x02, 0x00, 0xDF, 0x01, 0x00]);
        assert_eq!(image_dimensions(&vp8x), Some((640, 480)));

        let mut vp8l = b"RIFF\0\0\0\0WEBPVP8L".to_vec();
        vp8l.extend_from_slice(&[0; 4]);
        vp8l.push(0x2F);
        // width 100, height 50 encoded as (w-1) | (h-1) << 14
        let bits: u32 = 99 | (49 << 14);
        vp8l.extend_from_slice(&bits.to_le_bytes());
        assert_eq!(image_dimensions(&vp8l), Some((100, 50)));
    }

    #[test]
    fn test_unknown_or_truncated_data() {
        assert_eq!(image_dimensions(b"hello"), None);
        assert_eq!(image_dimensions(b"\x89PNG\r\n\x1a\n"), None);
        assert_eq!(image_dimensions(b"RIFF\0\0\0\0WEBPVP8 "), None);
    }

    #[test]
    fn test_effective_mime_guesses_generic_types() {
        assert_eq!(effective_mime("photo.png", "application/octet-stream"), "image/png");
        assert_eq!(effective_mime("clip.mp3", ""), "audio/mpeg");
        assert_eq!(effective_mime("photo.png", "Image/JPEG"), "image/jpeg");
        assert_eq!(sanitize_original_name("C:\\tmp\\a.png"), "a.png");
    }

    #[tokio::test]
    async fn test_store_upload_writes_file_and_row() {
        let (service, _dir) = setup_test_service(1024 * 1024).await;
        let bytes = png_header(32, 16);

        let asset = service
            .store_upload(&bytes, "diagram.png", "image/png", " Diagram ", None)
            .await
            .unwrap();
        assert!(asset.filename.ends_with(".png"));
        assert_eq!(asset.url, format!("/uploads/{}", asset.filename));
        assert_eq!((asset.width, asset.height), (Some(32), Some(16)));
        assert_eq!(asset.alt_text, "Diagram");
        assert_eq!(asset.source, MediaSource::Upload);

        let on_disk = std::fs::read(service.upload_dir().join(&asset.filename)).unwrap();
        assert_eq!(on_disk, bytes);
    }

    #[tokio::test]
    async fn test_store_upload_rejects_bad_input() {
        let (service, _dir) = setup_test_service(64).await;
        let too_big = vec![0u8; 65];
        assert!(matches!(
            service.store_upload(&too_big, "big.png", "image/png", "", None).await,
            Err(MediaServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.store_upload(b"#!/bin/sh", "run.sh", "text/x-shellscript", "", None).await,
            Err(MediaServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.store_upload(&[], "empty.png", "image/png", "", None).await,
            Err(MediaServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_store_generated_marks_source() {
        let (service, _dir) = setup_test_service(1024).await;
        let asset = service
            .store_generated(b"ID3fake-mp3", "audio/mpeg", "Read the intro aloud", None)
            .await
            .unwrap();
        assert_eq!(asset.source, MediaSource::Ai);
        assert!(asset.filename.ends_with(".mp3"));
        assert_eq!(asset.alt_text, "Read the intro aloud");
        assert_eq!(asset.width, None);
    }

    #[tokio::test]
    async fn test_list_alt_text_and_delete() {
        let (service, _dir) = setup_test_service(1024).await;
        let image = service
            .store_upload(&png_header(1, 1), "a.png", "image/png", "", None)
            .await
            .unwrap();
        service
            .store_upload(b"OggS-data", "b.ogg", "audio/ogg", "", None)
            .await
            .unwrap();

        let params = ListParams::default();
        assert_eq!(service.list(None, &params).await.unwrap().total, 2);
        assert_eq!(service.list(Some(MediaKind::Image), &params).await.unwrap().total, 1);

        let updated = service.update_alt_text(image.id, "Pixel").await.unwrap();
        assert_eq!(updated.alt_text, "Pixel");
        assert!(matches!(
            service.update_alt_text(9999, "x").await,
            Err(MediaServiceError::NotFound(9999))
        ));

        let path = service.upload_dir().join(&image.filename);
        service.delete(image.id).await.unwrap();
        assert!(!path.exists());
        assert!(matches!(service.delete(image.id).await, Err(MediaServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_file() {
        let (service, _dir) = setup_test_service(1024).await;
        let asset = service
            .store_upload(&png_header(2, 2), "a.png", "image/png", "", None)
            .await
            .unwrap();
        std::fs::remove_file(service.upload_dir().join(&asset.filename)).unwrap();
        assert!(service.delete(asset.id).await.is_ok());
    }
}
