//! Common API utilities and shared types

use axum::extract::ConnectInfo;
use axum::http::{header, Extensions, HeaderMap, HeaderValue};
use std::net::{IpAddr, SocketAddr};
use serde::{Deserialize, Serialize};

use crate::api::middleware::ApiError;
use crate::config::AuthConfig;
use crate::models::{ListParams, PagedResult};

// ============================================================================
// Pagination
// ============================================================================

pub fn default_page() -> u32 {
    1
}

pub fn default_per_page() -> u32 {
    20
}

/// Basic pagination query parameters
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl PaginationQuery {
    pub fn params(&self) -> ListParams {
        ListParams::new(self.page, self.per_page)
    }
}

/// A page of results as returned to clients
#[derive(Debug, Serialize, Deserialize)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> From<PagedResult<T>> for PageResponse<T> {
    fn from(result: PagedResult<T>) -> Self {
        let total_pages = result.total_pages();
        Self {
            items: result.items,
            total: result.total,
            page: result.page,
            per_page: result.per_page,
            total_pages,
        }
    }
}

// ============================================================================
// Bodies shared by several resources
// ============================================================================

/// New order of a list, as the full sequence of ids
#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub ids: Vec<i64>,
}

/// Replacement membership list
#[derive(Debug, Deserialize)]
pub struct IdsRequest {
    pub ids: Vec<i64>,
}

// ============================================================================
// Session cookies
// ============================================================================

pub fn session_cookie(token: &str, auth: &AuthConfig) -> String {
    let mut cookie = format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        token,
        auth.session_days.max(1) * 24 * 60 * 60
    );
    if auth.secure_cookie {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_session_cookie() -> &'static str {
    "session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"
}

/// Headers carrying a `Set-Cookie` value
pub fn set_cookie_headers(cookie: &str) -> Result<HeaderMap, ApiError> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|_| ApiError::internal_error("Invalid session cookie"))?;
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, value);
    Ok(headers)
}

/// Client address from proxy headers, else the peer of the connection
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> Option<IpAddr> {
    extract_ip_address(headers).or_else(|| {
        extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    })
}

/// Client address from proxy headers, if present
pub fn extract_ip_address(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(ip) = forwarded.split(',').next().and_then(|ip| ip.trim().parse().ok()) {
            return Some(ip);
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|ip| ip.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_response_counts_pages() {
        let result = PagedResult::new(vec![1, 2], 41, &ListParams::new(1, 20));
        let page: PageResponse<i32> = result.into();
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items, vec![1, 2]);
    }

    #[test]
    fn test_session_cookie_flags() {
        let mut auth = AuthConfig::default();
        auth.session_days = 2;
        auth.secure_cookie = false;
        let cookie = session_cookie("abc", &auth);
        assert!(cookie.starts_with("session=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=172800"));
        assert!(!cookie.contains("Secure"));

        auth.secure_cookie = true;
        assert!(session_cookie("abc", &auth).ends_with("; Secure"));
    }

    #[test]
    fn test_client_ip_falls_back_to_peer() {
        let mut headers = HeaderMap::new();
        let mut extensions = Extensions::new();
        assert!(client_ip(&headers, &extensions).is_none());

        extensions.insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 9], 40000))));
        assert_eq!(client_ip(&headers, &extensions), Some("192.0.2.9".parse().unwrap()));

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers, &extensions), Some("10.0.0.2".parse().unwrap()));
    }

    #[test]
    fn test_extract_ip_address() {
        let mut headers = HeaderMap::new();
        assert!(extract_ip_address(&headers).is_none());

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(extract_ip_address(&headers), Some("10.0.0.2".parse().unwrap()));

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(extract_ip_address(&headers), Some("203.0.113.7".parse().unwrap()));
    }
}
