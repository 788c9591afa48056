//! Logging setup and log-record shaping.
//!
//! Everything that ends up in a log record about a request goes through the
//! serializers here, which strip credentials before emission.

use std::collections::BTreeMap;

use axum::http::HeaderMap;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{AppInfoConfig, LoggingConfig};

pub const REDACTED: &str = "[REDACTED]";

const SENSITIVE_HEADERS: [&str; 3] = ["authorization", "cookie", "set-cookie"];
const SENSITIVE_FIELDS: [&str; 2] = ["password", "token"];

/// Keeps the non-blocking writers alive; drop only at process end.
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

pub fn default_level(app: &AppInfoConfig) -> &'static str {
    if app.is_production() {
        "info,tower_http=info"
    } else {
        "debug,tower_http=debug,sqlx=info"
    }
}

/// Installs the global subscriber: stdout plus an optional daily rolling file.
pub fn init(app: &AppInfoConfig, cfg: &LoggingConfig) -> anyhow::Result<LogGuards> {
    let fallback = cfg.level.clone().unwrap_or_else(|| default_level(app).to_string());
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(fallback))?;

    let (stdout_nb, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let mut guards = vec![stdout_guard];

    let file_layer = match cfg.directory.as_deref() {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, &cfg.file_prefix);
            let (file_nb, file_guard) = tracing_appender::non_blocking(file_appender);
            guards.push(file_guard);
            Some(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_nb))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(stdout_nb))
        .with(file_layer)
        .try_init()?;

    Ok(LogGuards { _guards: guards })
}

/// Copies headers into a log-friendly map with credentials replaced.
pub fn sanitize_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (name, value) in headers {
        let key = name.as_str().to_string();
        let shown = if SENSITIVE_HEADERS.contains(&name.as_str()) {
            REDACTED.to_string()
        } else {
            String::from_utf8_lossy(value.as_bytes()).into_owned()
        };
        out.entry(key)
            .and_modify(|v: &mut String| {
                v.push_str(", ");
                v.push_str(&shown);
            })
            .or_insert(shown);
    }
    out
}

fn is_sensitive_field(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_FIELDS.iter().any(|f| lower.contains(f))
}

/// Replaces password- and token-like fields at any depth.
pub fn redact_body(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (k, v) in map.iter_mut() {
                if is_sensitive_field(k) {
                    *v = Value::String(REDACTED.to_string());
                } else {
                    redact_body(v);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_body),
        _ => {}
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SerializedRequest {
    pub method: String,
    pub url: String,
    pub path: String,
    pub parameters: Map<String, Value>,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SerializedResponse {
    pub status_code: u16,
    pub duration: f64,
    pub success: bool,
    pub url: String,
    pub method: String,
}

impl SerializedResponse {
    pub fn new(method: &str, url: &str, status_code: u16, duration_ms: f64) -> Self {
        Self {
            status_code,
            duration: duration_ms,
            success: (200..400).contains(&status_code),
            url: url.to_string(),
            method: method.to_string(),
        }
    }
}
