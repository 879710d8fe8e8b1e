//! Static file serving
//!
//! - /assets/{*path} - Stylesheets and images embedded in the binary
//! - /uploads/{*path} - Media library files from the upload directory

use std::path::{Component, Path as FsPath, PathBuf};

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use rust_embed::RustEmbed;
use tokio::fs;

use crate::api::middleware::{cache_control_static, AppState};

/// Embedded site assets
#[derive(RustEmbed)]
#[folder = "assets/"]
struct SiteAssets;

/// One hour; embedded assets change only with a new build
const ASSET_MAX_AGE: u32 = 3600;
/// Uploaded filenames are random and never reused
const UPLOAD_MAX_AGE: u32 = 31_536_000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/assets/{*path}", get(serve_asset))
        .route("/uploads/{*path}", get(serve_upload))
}

async fn serve_asset(Path(path): Path<String>) -> Response {
    let decoded = urlencoding::decode(&path).map(|p| p.into_owned()).unwrap_or(path);
    match SiteAssets::get(decoded.trim_start_matches('/')) {
        Some(content) => build_response(&decoded, content.data.into_owned(), false, ASSET_MAX_AGE),
        None => not_found(),
    }
}

async fn serve_upload(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let decoded = urlencoding::decode(&path).map(|p| p.into_owned()).unwrap_or(path);
    let Some(file_path) = resolve_within(state.media_service.upload_dir(), &decoded) else {
        tracing::warn!("Rejected upload path: {}", decoded);
        return not_found();
    };

    match fs::read(&file_path).await {
        Ok(contents) => build_response(&decoded, contents, true, UPLOAD_MAX_AGE),
        Err(_) => not_found(),
    }
}

/// Join `relative` onto `root`, refusing anything that could escape it
fn resolve_within(root: &FsPath, relative: &str) -> Option<PathBuf> {
    let relative = FsPath::new(relative.trim_start_matches('/'));
    let mut resolved = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (resolved != root).then_some(resolved)
}

fn build_response(path: &str, data: Vec<u8>, immutable: bool, max_age: u32) -> Response {
    let content_type = mime_guess::from_path(path).first_or_octet_stream();
    (
        [
            (header::CONTENT_TYPE, content_type.essence_str().to_string()),
            (header::CACHE_CONTROL, cache_control_static(max_age, immutable)),
        ],
        Body::from(data),
    )
        .into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}
