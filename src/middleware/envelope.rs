//! Response envelope middleware.
//!
//! Every response that leaves the router passes through
//! [`envelope_middleware`] once, after the handler has finished. Structured
//! bodies get a `meta` block with the completion timestamp, the request id and
//! the elapsed time; other JSON values and plain text are wrapped as
//! `{ "data": ..., "meta": ... }`; anything else is forwarded untouched.
//!
//! The body is classified into a [`Payload`] once, from its content type and
//! bytes, and everything downstream works on that tag.

use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes, HttpBody},
    extract::Request,
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, IntoResponseParts, Response, ResponseParts},
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::reply::Reply;

/// Bodies above this size are forwarded without an envelope.
pub const MAX_ENVELOPE_BYTES: u64 = 4 * 1024 * 1024;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Marks a response that must be sent exactly as the handler produced it.
///
/// Attach it per route with [`skip_envelope`] or return it from a handler as a
/// response part: `(SkipEnvelope, bytes)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipEnvelope;

impl IntoResponseParts for SkipEnvelope {
    type Error = std::convert::Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        res.extensions_mut().insert(self);
        Ok(res)
    }
}

/// Route layer that disables the envelope for the routes it wraps.
pub async fn skip_envelope(req: Request, next: Next) -> Response {
    let mut res = next.run(req).await;
    res.extensions_mut().insert(SkipEnvelope);
    res
}

/// Metadata injected into every envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvelopeMeta {
    pub timestamp: String,
    pub request_id: String,
    pub response_time: String,
}

impl EnvelopeMeta {
    pub fn new(request_id: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            timestamp: chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
            request_id: request_id.into(),
            response_time: format!("{:.2}ms", elapsed.as_secs_f64() * 1000.0),
        }
    }

    fn into_map(self) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("timestamp".to_string(), Value::String(self.timestamp));
        m.insert("request_id".to_string(), Value::String(self.request_id));
        m.insert("response_time".to_string(), Value::String(self.response_time));
        m
    }
}

/// A response body, tagged by how the envelope treats it.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A JSON object; gets a merged `meta` key.
    Object(Map<String, Value>),
    /// Any other JSON value or plain text; wrapped under `data`.
    Value(Value),
    /// Opaque bytes; forwarded unmodified.
    Raw(Bytes),
}

impl Payload {
    pub fn classify(content_type: Option<&str>, bytes: Bytes) -> Self {
        let mime = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|m| m.trim().to_ascii_lowercase());

        match mime.as_deref() {
            Some(m) if is_json(m) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(obj)) => Payload::Object(obj),
                Ok(other) => Payload::Value(other),
                // Malformed JSON is passed through, never rejected here
                Err(_) => Payload::Raw(bytes),
            },
            None | Some("text/plain") => {
                if bytes.is_empty() {
                    return Payload::Value(Value::Null);
                }
                match std::str::from_utf8(&bytes) {
                    Ok(s) => Payload::Value(Value::String(s.to_string())),
                    Err(_) => Payload::Raw(bytes),
                }
            }
            Some(_) => Payload::Raw(bytes),
        }
    }
}

fn is_json(mime: &str) -> bool {
    mime == "application/json" || mime.ends_with("+json")
}

/// Applies the envelope; `None` means "send the original bytes".
///
/// The handler's own `meta` keys are kept, but `timestamp`, `request_id` and
/// `response_time` are always the fresh values.
pub fn envelope(payload: Payload, meta: EnvelopeMeta) -> Option<Value> {
    match payload {
        Payload::Object(mut obj) => {
            let mut merged = match obj.remove("meta") {
                Some(Value::Object(existing)) => existing,
                _ => Map::new(),
            };
            merged.extend(meta.into_map());
            obj.insert("meta".to_string(), Value::Object(merged));
            Some(Value::Object(obj))
        }
        Payload::Value(data) => {
            let mut obj = Map::new();
            obj.insert("data".to_string(), data);
            obj.insert("meta".to_string(), Value::Object(meta.into_map()));
            Some(Value::Object(obj))
        }
        Payload::Raw(_) => None,
    }
}

pub async fn envelope_middleware(req: Request, next: Next) -> Response {
    let started = Instant::now();
    let request_id = request_id_of(req.headers());

    let res = next.run(req).await;

    if res.extensions().get::<SkipEnvelope>().is_some() || !carries_body(res.status()) {
        return res;
    }
    let meta = EnvelopeMeta::new(request_id, started.elapsed());
    wrap_response(res, meta).await
}

fn request_id_of(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn carries_body(status: StatusCode) -> bool {
    !(status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED || status.is_informational())
}

async fn wrap_response(res: Response, meta: EnvelopeMeta) -> Response {
    let (mut parts, body) = res.into_parts();

    // Streams and oversized bodies stay untouched
    match body.size_hint().exact() {
        Some(n) if n <= MAX_ENVELOPE_BYTES => {}
        _ => return Response::from_parts(parts, body),
    }

    let bytes = match axum::body::to_bytes(body, MAX_ENVELOPE_BYTES as usize).await {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(status = %parts.status, "Failed to buffer response body for envelope: {}", e);
            return unreadable_body(meta);
        }
    };

    let content_type = parts.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let payload = Payload::classify(content_type, bytes.clone());

    let Some(value) = envelope(payload, meta) else {
        return Response::from_parts(parts, Body::from(bytes));
    };

    match serde_json::to_vec(&value) {
        Ok(out) => {
            parts.headers.remove(CONTENT_LENGTH);
            parts.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Response::from_parts(parts, Body::from(out))
        }
        Err(e) => {
            tracing::warn!("Failed to serialize envelope, sending original body: {}", e);
            Response::from_parts(parts, Body::from(bytes))
        }
    }
}

/// Replacement for a response whose body failed mid-read. The original bytes
/// are gone, so the caller gets a 500 instead of an empty success.
pub fn unreadable_body(meta: EnvelopeMeta) -> Response {
    let reply = Reply::error("An internal server error occurred", 500);
    let status = reply.status();
    let enveloped = serde_json::to_value(&reply)
        .ok()
        .and_then(|v| match v {
            Value::Object(obj) => envelope(Payload::Object(obj), meta),
            _ => None,
        });
    match enveloped {
        Some(value) => (status, Json(value)).into_response(),
        None => reply.into_response(),
    }
}
