//! HTTP-level tests over the full router: JSON API, site pages and statics

use axum::extract::ConnectInfo;
use axum::Extension;
use axum::http::StatusCode;
use std::net::SocketAddr;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use serde_json::{json, Value};
use tempfile::TempDir;

use super::*;
use crate::cache::create_cache;
use crate::config::Config;
use crate::db::{create_test_pool, migrations::run_migrations};
use crate::theme::ThemeEngine;

const PASSWORD: &str = "correct-horse-battery";

struct TestApp {
    server: TestServer,
    _uploads: TempDir,
}

async fn test_app() -> TestApp {
    test_app_with(None, |_| {}).await
}

/// App whose requests appear to come from `peer` when one is given
async fn test_app_with(peer: Option<SocketAddr>, configure: impl FnOnce(&mut Config)) -> TestApp {
    let pool = create_test_pool().await.unwrap();
    run_migrations(&pool).await.unwrap();

    let uploads = TempDir::new().unwrap();
    let mut config = Config::default();
    config.upload.path = uploads.path().to_path_buf();
    configure(&mut config);

    let cache = create_cache(&config.cache);
    let theme = ThemeEngine::new(None).unwrap();
    let state = AppState::build(&config, pool, cache, theme).unwrap();
    let router = build_router(state, "http://localhost:3000");
    let server = match peer {
        Some(addr) => TestServer::new(router.layer(Extension(ConnectInfo(addr)))).unwrap(),
        None => TestServer::new(router).unwrap(),
    };

    TestApp {
        server,
        _uploads: uploads,
    }
}

/// Register the first account and return its bearer token
async fn register_admin(server: &TestServer) -> String {
    let response = server
        .post("/api/v1/auth/register")
        .json(&json!({ "username": "admin", "email": "admin@example.com", "password": PASSWORD }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    body["token"].as_str().unwrap().to_string()
}

async fn create_editor(server: &TestServer, admin_token: &str) -> String {
    server
        .post("/api/v1/admin/users")
        .authorization_bearer(admin_token)
        .json(&json!({
            "username": "editor",
            "email": "editor@example.com",
            "password": PASSWORD,
            "role": "editor"
        }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server
        .post("/api/v1/auth/login")
        .json(&json!({ "login": "editor", "password": PASSWORD }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    body["token"].as_str().unwrap().to_string()
}

/// A published module with one topic holding one published article
async fn seed_content(server: &TestServer, token: &str) -> (i64, i64, i64) {
    let module: Value = server
        .post("/api/v1/admin/modules")
        .authorization_bearer(token)
        .json(&json!({ "title": "Getting Started", "is_published": true }))
        .await
        .json();
    let module_id = module["id"].as_i64().unwrap();

    let topic: Value = server
        .post(&format!("/api/v1/admin/modules/{}/topics", module_id))
        .authorization_bearer(token)
        .json(&json!({ "title": "Installation" }))
        .await
        .json();
    let topic_id = topic["id"].as_i64().unwrap();

    let article: Value = server
        .post("/api/v1/admin/articles")
        .authorization_bearer(token)
        .json(&json!({
            "title": "Install on Linux",
            "content": "<p>Download the binary.</p>",
            "status": "published",
            "topic_ids": [topic_id],
            "tags": ["linux", "setup"]
        }))
        .await
        .json();
    let article_id = article["id"].as_i64().unwrap();

    (module_id, topic_id, article_id)
}

#[tokio::test]
async fn test_setup_status_flips_after_register() {
    let app = test_app().await;

    let before: Value = app.server.get("/api/v1/auth/setup-status").await.json();
    assert_eq!(before["has_users"], json!(false));

    register_admin(&app.server).await;

    let after: Value = app.server.get("/api/v1/auth/setup-status").await.json();
    assert_eq!(after["has_users"], json!(true));
}

#[tokio::test]
async fn test_register_only_allowed_once() {
    let app = test_app().await;
    register_admin(&app.server).await;

    app.server
        .post("/api/v1/auth/register")
        .json(&json!({ "username": "second", "email": "second@example.com", "password": PASSWORD }))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_register_sets_session_cookie() {
    let app = test_app().await;
    let response = app
        .server
        .post("/api/v1/auth/register")
        .json(&json!({ "username": "admin", "email": "admin@example.com", "password": PASSWORD }))
        .await;

    let cookie = response.headers().get("set-cookie").unwrap().to_str().unwrap().to_string();
    assert!(cookie.starts_with("session="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
}

#[tokio::test]
async fn test_admin_routes_require_auth() {
    let app = test_app().await;

    app.server
        .get("/api/v1/admin/dashboard")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    app.server
        .post("/api/v1/admin/modules")
        .json(&json!({ "title": "Nope" }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let app = test_app().await;
    register_admin(&app.server).await;

    app.server
        .post("/api/v1/auth/login")
        .json(&json!({ "login": "admin", "password": "not-the-password" }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_attempts_limited_per_direct_client() {
    let app = test_app_with(Some(SocketAddr::from(([198, 51, 100, 4], 5000))), |_| {}).await;
    register_admin(&app.server).await;

    for attempt in 0..10 {
        app.server
            .post("/api/v1/auth/login")
            .json(&json!({ "login": format!("user{}", attempt), "password": "guess" }))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    app.server
        .post("/api/v1/auth/login")
        .json(&json!({ "login": "user10", "password": "guess" }))
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);

    // A proxied client is keyed on its forwarded address instead
    app.server
        .post("/api/v1/auth/login")
        .add_header("x-forwarded-for", "203.0.113.50")
        .json(&json!({ "login": "admin", "password": PASSWORD }))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_editor_cannot_manage_users_or_settings() {
    let app = test_app().await;
    let admin = register_admin(&app.server).await;
    let editor = create_editor(&app.server, &admin).await;

    app.server
        .get("/api/v1/admin/users")
        .authorization_bearer(&editor)
        .await
        .assert_status(StatusCode::FORBIDDEN);
    app.server
        .get("/api/v1/admin/settings")
        .authorization_bearer(&editor)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    // Editors still reach content routes
    app.server
        .get("/api/v1/admin/dashboard")
        .authorization_bearer(&editor)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_protected_responses_are_not_cached() {
    let app = test_app().await;
    let token = register_admin(&app.server).await;

    let response = app
        .server
        .get("/api/v1/auth/me")
        .authorization_bearer(&token)
        .await;
    response.assert_status_ok();
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "no-cache, no-store, must-revalidate"
    );
}

#[tokio::test]
async fn test_public_tree_hides_unpublished_modules() {
    let app = test_app().await;
    let token = register_admin(&app.server).await;
    seed_content(&app.server, &token).await;

    app.server
        .post("/api/v1/admin/modules")
        .authorization_bearer(&token)
        .json(&json!({ "title": "Internal Notes" }))
        .await
        .assert_status(StatusCode::CREATED);

    let public: Value = app.server.get("/api/v1/modules").await.json();
    let titles: Vec<&str> = public
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Getting Started"]);

    let admin: Value = app
        .server
        .get("/api/v1/admin/modules")
        .authorization_bearer(&token)
        .await
        .json();
    assert_eq!(admin.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_slug_check_reports_taken_and_malformed() {
    let app = test_app().await;
    let token = register_admin(&app.server).await;
    let (module_id, _, _) = seed_content(&app.server, &token).await;

    let taken: Value = app
        .server
        .get("/api/v1/admin/slugs/check")
        .authorization_bearer(&token)
        .add_query_params(json!({ "entity": "module", "slug": "getting-started" }))
        .await
        .json();
    assert_eq!(taken["available"], json!(false));

    let own: Value = app
        .server
        .get("/api/v1/admin/slugs/check")
        .authorization_bearer(&token)
        .add_query_params(json!({ "entity": "module", "slug": "getting-started", "exclude_id": module_id }))
        .await
        .json();
    assert_eq!(own["available"], json!(true));

    let malformed: Value = app
        .server
        .get("/api/v1/admin/slugs/check")
        .authorization_bearer(&token)
        .add_query_params(json!({ "entity": "article", "slug": "Bad Slug" }))
        .await
        .json();
    assert_eq!(malformed["available"], json!(false));
    assert!(malformed["reason"].is_string());
}

#[tokio::test]
async fn test_view_endpoint_counts_published_articles() {
    let app = test_app().await;
    let token = register_admin(&app.server).await;
    let (_, _, article_id) = seed_content(&app.server, &token).await;

    let first: Value = app
        .server
        .post(&format!("/api/v1/articles/{}/view", article_id))
        .await
        .json();
    let second: Value = app
        .server
        .post(&format!("/api/v1/articles/{}/view", article_id))
        .await
        .json();
    assert_eq!(first["view_count"], json!(1));
    assert_eq!(second["view_count"], json!(2));

    let draft: Value = app
        .server
        .post("/api/v1/admin/articles")
        .authorization_bearer(&token)
        .json(&json!({ "title": "Unfinished" }))
        .await
        .json();
    app.server
        .post(&format!("/api/v1/articles/{}/view", draft["id"].as_i64().unwrap()))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_search_and_tag_listing() {
    let app = test_app().await;
    let token = register_admin(&app.server).await;
    seed_content(&app.server, &token).await;

    let results: Value = app
        .server
        .get("/api/v1/search")
        .add_query_param("q", "binary")
        .await
        .json();
    assert_eq!(results["total"], json!(1));
    assert_eq!(results["items"][0]["slug"], json!("install-on-linux"));

    let tagged: Value = app.server.get("/api/v1/tags/linux/articles").await.json();
    assert_eq!(tagged["total"], json!(1));

    app.server
        .get("/api/v1/tags/windows/articles")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

fn tiny_png() -> Vec<u8> {
    let mut png = b"\x89PNG\r\n\x1a\n\0\0\0\x0dIHDR".to_vec();
    png.extend_from_slice(&16u32.to_be_bytes());
    png.extend_from_slice(&8u32.to_be_bytes());
    png
}

#[tokio::test]
async fn test_media_upload_stores_file_and_alt_text() {
    let app = test_app().await;
    let token = register_admin(&app.server).await;

    let form = MultipartForm::new().add_text("alt_text", "Team logo").add_part(
        "file",
        Part::bytes(tiny_png()).file_name("logo.png").mime_type("image/png"),
    );
    let response = app
        .server
        .post("/api/v1/admin/media")
        .authorization_bearer(&token)
        .multipart(form)
        .await;
    response.assert_status(StatusCode::CREATED);

    let asset: Value = response.json();
    assert_eq!(asset["alt_text"], json!("Team logo"));
    assert_eq!(asset["original_name"], json!("logo.png"));
    assert_eq!((asset["width"].as_i64(), asset["height"].as_i64()), (Some(16), Some(8)));

    let url = asset["url"].as_str().unwrap();
    let served = app.server.get(url).await;
    served.assert_status_ok();
    assert_eq!(served.as_bytes().to_vec(), tiny_png());

    let listed: Value = app
        .server
        .get("/api/v1/admin/media")
        .authorization_bearer(&token)
        .await
        .json();
    assert_eq!(listed["total"], json!(1));
}

#[tokio::test]
async fn test_media_upload_requires_file() {
    let app = test_app().await;
    let token = register_admin(&app.server).await;

    let response = app
        .server
        .post("/api/v1/admin/media")
        .authorization_bearer(&token)
        .multipart(MultipartForm::new().add_text("alt_text", "nothing attached"))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["message"], json!("No file provided"));
}

#[tokio::test]
async fn test_media_upload_body_limit_follows_max_file_size() {
    let app = test_app_with(None, |config| config.upload.max_file_size = 1024).await;
    let token = register_admin(&app.server).await;

    let over_file_limit = MultipartForm::new().add_part(
        "file",
        Part::bytes(vec![0u8; 2048]).file_name("big.png").mime_type("image/png"),
    );
    app.server
        .post("/api/v1/admin/media")
        .authorization_bearer(&token)
        .multipart(over_file_limit)
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let over_body_limit = MultipartForm::new().add_part(
        "file",
        Part::bytes(vec![0u8; 200 * 1024]).file_name("huge.png").mime_type("image/png"),
    );
    app.server
        .post("/api/v1/admin/media")
        .authorization_bearer(&token)
        .multipart(over_body_limit)
        .await
        .assert_status(StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_ai_endpoints_unavailable_without_provider() {
    let app = test_app().await;
    let token = register_admin(&app.server).await;

    app.server
        .post("/api/v1/admin/ai/text")
        .authorization_bearer(&token)
        .json(&json!({ "action": "generate", "prompt": "Write an intro" }))
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    let dashboard: Value = app
        .server
        .get("/api/v1/admin/dashboard")
        .authorization_bearer(&token)
        .await
        .json();
    assert_eq!(dashboard["ai_available"], json!(false));
}

#[tokio::test]
async fn test_site_pages_render() {
    let app = test_app().await;
    let token = register_admin(&app.server).await;
    seed_content(&app.server, &token).await;

    let home = app.server.get("/").await;
    home.assert_status_ok();
    assert!(home.text().contains("Getting Started"));

    let module = app.server.get("/modules/getting-started").await;
    module.assert_status_ok();
    assert!(module.text().contains("Install on Linux"));

    let article = app.server.get("/articles/install-on-linux").await;
    article.assert_status_ok();
    let html = article.text();
    assert!(html.contains("Download the binary."));
    assert!(html.contains("/topics/installation"));

    app.server.get("/tags/linux").await.assert_status_ok();
    app.server
        .get("/search")
        .add_query_param("q", "linux")
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_unknown_pages_render_not_found() {
    let app = test_app().await;

    app.server
        .get("/modules/missing")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    app.server
        .get("/articles/missing")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    let fallback = app.server.get("/no/such/page").await;
    fallback.assert_status(StatusCode::NOT_FOUND);
    assert!(fallback.text().contains("<html"));
}

#[tokio::test]
async fn test_admin_page_redirects_to_login() {
    let app = test_app().await;

    let response = app.server.get("/admin").await;
    assert!(response.status_code().is_redirection());
    assert_eq!(response.headers().get("location").unwrap(), "/admin/login");

    app.server.get("/admin/login").await.assert_status_ok();
}

#[tokio::test]
async fn test_admin_login_form_sets_cookie() {
    let app = test_app().await;
    register_admin(&app.server).await;

    let response = app
        .server
        .post("/admin/login")
        .form(&[("login", "admin"), ("password", PASSWORD)])
        .await;
    assert!(response.status_code().is_redirection());
    assert_eq!(response.headers().get("location").unwrap(), "/admin");
    let cookie = response.headers().get("set-cookie").unwrap().to_str().unwrap();
    let token = cookie
        .trim_start_matches("session=")
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let dashboard = app.server.get("/admin").authorization_bearer(&token).await;
    dashboard.assert_status_ok();
    assert!(dashboard.text().contains("admin"));
}

#[tokio::test]
async fn test_admin_login_form_shows_error() {
    let app = test_app().await;
    register_admin(&app.server).await;

    let response = app
        .server
        .post("/admin/login")
        .form(&[("login", "admin"), ("password", "wrong-password")])
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert!(response.text().contains("class=\"error\""));
}

#[tokio::test]
async fn test_embedded_stylesheet_served() {
    let app = test_app().await;

    let response = app.server.get("/assets/style.css").await;
    response.assert_status_ok();
    assert_eq!(response.headers().get("content-type").unwrap(), "text/css");
}
