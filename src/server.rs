//! Router assembly and the listener task.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::extract::DefaultBodyLimit;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::{body::Body, http::Request, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::middleware::{self, envelope::REQUEST_ID_HEADER};
use crate::routes;
use crate::shutdown::Closeable;
use crate::state::AppState;

/// Builds the full application router.
///
/// Layer order, outermost first: CORS, security headers, request id,
/// tracing span, request log, envelope, ACL, handler.
pub fn build_router(state: AppState) -> Router {
    let cfg = state.config.clone();
    let request_id = axum::http::HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .route("/", get(routes::health::root))
        .route("/ping", get(routes::health::ping))
        .route("/healthz", get(routes::health::healthz).layer(from_fn(middleware::skip_envelope)))
        .route("/status", get(routes::health::status))
        .route("/version", get(routes::health::version))
        .route("/users", get(routes::users::list_users).post(routes::users::create_user))
        .route("/users/{id}", get(routes::users::get_user).delete(routes::users::delete_user))
        .fallback(routes::health::not_found)
        .method_not_allowed_fallback(routes::health::method_not_allowed)
        .layer(from_fn_with_state(state.acl.clone(), middleware::acl::acl_middleware))
        .with_state(state)
        // 1 MiB request body cap
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(from_fn(middleware::envelope::envelope_middleware))
        .layer(from_fn(middleware::request_log::request_log_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
            let id = req
                .extensions()
                .get::<RequestId>()
                .and_then(|id| id.header_value().to_str().ok())
                .unwrap_or("-");
            tracing::info_span!("request", method = %req.method(), uri = %req.uri(), request_id = %id)
        }))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(from_fn_with_state(cfg.clone(), middleware::security_headers::security_headers_middleware))
        .layer(middleware::cors::cors_layer(&cfg.cors))
}

/// Handle to the spawned `axum::serve` task.
///
/// Closing stops the accept loop and waits for in-flight requests to drain.
pub struct ServerHandle {
    local_addr: SocketAddr,
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<std::io::Result<()>>>>,
}

impl ServerHandle {
    /// Spawns the server on `listener` and returns immediately.
    pub fn spawn(listener: TcpListener, app: Router) -> std::io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let token = CancellationToken::new();
        let stop = token.clone();
        let task = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await
        });
        tracing::info!("Listening on http://{}", local_addr);
        Ok(Self { local_addr, token, task: Mutex::new(Some(task)) })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_closing(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[async_trait]
impl Closeable for ServerHandle {
    fn name(&self) -> &'static str {
        "http listener"
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.token.cancel();
        let task = self.task.lock().await.take();
        let Some(task) = task else {
            return Ok(());
        };
        match task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow::anyhow!("server error while draining: {}", e)),
            Err(e) => Err(anyhow::anyhow!("server task failed: {}", e)),
        }
    }
}
