use crate::error::{AppError, AppResult};
use crate::reply::{ErrorResponse, Reply, SuccessResponse};
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Serialize)]
pub struct Hello {
    pub message: &'static str,
}

pub async fn root() -> Json<Hello> {
    Json(Hello { message: "Hello World!" })
}

// Database round trip; the envelope turns the text into { data, meta }
pub async fn ping(State(state): State<AppState>) -> &'static str {
    if state.db.health_check().await {
        "pong!"
    } else {
        ":("
    }
}

// Liveness probe - mounted with the envelope disabled, always plain "ok"
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[derive(Serialize)]
pub struct StatusReport {
    pub status: &'static str,
    pub database: bool,
    pub uptime_seconds: u64,
}

// Readiness/load report; 503 while the database is unreachable
pub async fn status(State(state): State<AppState>) -> AppResult<SuccessResponse<StatusReport>> {
    if !state.db.health_check().await {
        return Err(AppError::ServiceUnavailable("Under Pressure".to_string()));
    }
    Ok(Reply::success(StatusReport {
        status: "ok",
        database: true,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    }))
}

// Version/Build info endpoint (JSON)
pub async fn version(State(state): State<AppState>) -> SuccessResponse<Value> {
    Reply::success(json!({
        "name": state.config.app.name,
        "version": env!("CARGO_PKG_VERSION"),
        "package": {
            "name": env!("CARGO_PKG_NAME"),
            "description": env!("CARGO_PKG_DESCRIPTION"),
            "license": env!("CARGO_PKG_LICENSE"),
        },
        "build": {
            "profile": if cfg!(debug_assertions) { "debug" } else { "release" },
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        }
    }))
}

// Unmatched routes
pub async fn not_found() -> ErrorResponse {
    Reply::not_found(None)
}

// Known path, unsupported method
pub async fn method_not_allowed() -> ErrorResponse {
    Reply::error("Method Not Allowed", 405)
}
