use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::{Body, HttpBody},
    extract::{ConnectInfo, MatchedPath, Query, Request},
    http::header::CONTENT_TYPE,
    middleware::Next,
    response::Response,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::Level;

use crate::logging::{redact_body, sanitize_headers, SerializedRequest, SerializedResponse};

/// JSON request bodies up to this size are included (redacted) in debug logs.
const MAX_LOGGED_BODY: u64 = 64 * 1024;

/// Emits one "incoming request" and one "request completed" record per request.
pub async fn request_log_middleware(req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().to_string();
    let url = req.uri().to_string();

    let req = if tracing::enabled!(Level::DEBUG) {
        let (serialized, req) = serialize_request(req).await;
        match serde_json::to_string(&serialized) {
            Ok(json) => tracing::debug!(req = %json, "incoming request"),
            Err(e) => tracing::warn!("Failed to serialize request for logging: {}", e),
        }
        req
    } else {
        req
    };

    let res = next.run(req).await;

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    let serialized = SerializedResponse::new(&method, &url, res.status().as_u16(), elapsed_ms);
    match serde_json::to_string(&serialized) {
        Ok(json) if serialized.status_code >= 500 => tracing::error!(res = %json, "request completed"),
        Ok(json) => tracing::info!(res = %json, "request completed"),
        Err(e) => tracing::warn!("Failed to serialize response for logging: {}", e),
    }
    res
}

/// Builds the log view of `req`, handing back a request with an intact body.
async fn serialize_request(req: Request) -> (SerializedRequest, Request) {
    let (parts, body) = req.into_parts();

    let mut parameters = Map::new();
    if let Ok(Query(query)) = Query::<HashMap<String, String>>::try_from_uri(&parts.uri) {
        for (k, v) in query {
            parameters.insert(k, Value::String(v));
        }
    }

    let is_json = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.starts_with("application/json"))
        .unwrap_or(false);
    let small = matches!(body.size_hint().exact(), Some(n) if n > 0 && n <= MAX_LOGGED_BODY);

    let body = if is_json && small {
        match axum::body::to_bytes(body, MAX_LOGGED_BODY as usize).await {
            Ok(bytes) => {
                if let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(&bytes) {
                    for (k, v) in fields {
                        parameters.insert(k, v);
                    }
                }
                Body::from(bytes)
            }
            Err(e) => {
                tracing::warn!("Failed to buffer request body for logging: {}", e);
                Body::empty()
            }
        }
    } else {
        body
    };

    let mut params = Value::Object(parameters);
    redact_body(&mut params);
    let parameters = match params {
        Value::Object(m) => m,
        _ => Map::new(),
    };

    let serialized = SerializedRequest {
        method: parts.method.to_string(),
        url: parts.uri.to_string(),
        path: parts
            .extensions
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string()),
        parameters,
        headers: sanitize_headers(&parts.headers),
        remote_address: parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string()),
    };

    (serialized, Request::from_parts(parts, body))
}
