//! Security headers middleware for HTTP responses.
//!
//! Applies a helmet-style header set to every response and a no-store
//! caching policy to JSON bodies.

use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::config::AppConfig;

pub const DEFAULT_CSP: &str = "default-src 'self';base-uri 'self';font-src 'self' https: data:;\
form-action 'self';frame-ancestors 'self';img-src 'self' data:;object-src 'none';\
script-src 'self';script-src-attr 'none';style-src 'self' https: 'unsafe-inline';\
upgrade-insecure-requests";

const DEFAULT_HSTS_MAX_AGE: u64 = 15_552_000; // 180 days

/// Adds standard security-related HTTP headers to all responses.
///
/// # Security Headers Applied
///
/// - `Content-Security-Policy` (configurable, helmet default otherwise)
/// - `Cross-Origin-Embedder-Policy: require-corp`
/// - `Cross-Origin-Opener-Policy: same-origin`
/// - `Cross-Origin-Resource-Policy: same-origin`
/// - `Origin-Agent-Cluster: ?1`
/// - `Referrer-Policy` (default `strict-origin-when-cross-origin`)
/// - `Strict-Transport-Security` (default 180 days, subdomains included)
/// - `X-Content-Type-Options: nosniff`
/// - `X-DNS-Prefetch-Control: off`
/// - `X-Download-Options: noopen`
/// - `X-Frame-Options: SAMEORIGIN`
/// - `X-Permitted-Cross-Domain-Policies: none`
/// - `X-XSS-Protection: 0`
pub async fn security_headers_middleware(
    State(cfg): State<Arc<AppConfig>>,
    req: Request,
    next: Next,
) -> Response {
    let mut res = next.run(req).await;
    let headers = res.headers_mut();
    let sec = &cfg.security;

    let csp = sec.csp.as_deref().filter(|c| !c.trim().is_empty()).unwrap_or(DEFAULT_CSP);
    match HeaderValue::from_str(csp) {
        Ok(val) => {
            headers.insert(HeaderName::from_static("content-security-policy"), val);
        }
        Err(e) => tracing::warn!("Invalid CSP header value: {}", e),
    }

    headers.insert(
        HeaderName::from_static("cross-origin-embedder-policy"),
        HeaderValue::from_static("require-corp"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(HeaderName::from_static("origin-agent-cluster"), HeaderValue::from_static("?1"));

    let referrer = sec.referrer_policy.as_deref().unwrap_or("strict-origin-when-cross-origin");
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_str(referrer).unwrap_or(HeaderValue::from_static("no-referrer")),
    );

    let max_age = sec.hsts_max_age.unwrap_or(DEFAULT_HSTS_MAX_AGE);
    let include_sub = if sec.hsts_include_subdomains.unwrap_or(true) { "; includeSubDomains" } else { "" };
    let value = format!("max-age={}{}", max_age, include_sub);
    headers.insert(
        HeaderName::from_static("strict-transport-security"),
        HeaderValue::from_str(&value).unwrap_or(HeaderValue::from_static("max-age=15552000")),
    );

    headers.insert(HeaderName::from_static("x-content-type-options"), HeaderValue::from_static("nosniff"));
    headers.insert(HeaderName::from_static("x-dns-prefetch-control"), HeaderValue::from_static("off"));
    headers.insert(HeaderName::from_static("x-download-options"), HeaderValue::from_static("noopen"));
    headers.insert(HeaderName::from_static("x-frame-options"), HeaderValue::from_static("SAMEORIGIN"));
    headers.insert(
        HeaderName::from_static("x-permitted-cross-domain-policies"),
        HeaderValue::from_static("none"),
    );
    headers.insert(HeaderName::from_static("x-xss-protection"), HeaderValue::from_static("0"));

    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .map(|s| s.starts_with("application/json"))
        .unwrap_or(false);
    if is_json {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    }

    res
}
