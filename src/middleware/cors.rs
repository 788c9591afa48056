use std::time::Duration;

use axum::http::{HeaderName, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::CorsConfig;

/// CORS layer reflecting the request origin.
///
/// Entries that fail to parse are skipped with a warning; `config::validate`
/// rejects them earlier on the normal startup path.
pub fn cors_layer(cfg: &CorsConfig) -> CorsLayer {
    let methods: Vec<Method> = cfg
        .allowed_methods
        .iter()
        .filter_map(|m| match Method::from_bytes(m.as_bytes()) {
            Ok(method) => Some(method),
            Err(e) => {
                tracing::warn!("Ignoring invalid CORS method {}: {}", m, e);
                None
            }
        })
        .collect();
    let headers: Vec<HeaderName> = cfg
        .allowed_headers
        .iter()
        .filter_map(|h| match HeaderName::from_bytes(h.as_bytes()) {
            Ok(name) => Some(name),
            Err(e) => {
                tracing::warn!("Ignoring invalid CORS header {}: {}", h, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(cfg.allow_credentials)
        .max_age(Duration::from_secs(cfg.max_age_secs))
}
