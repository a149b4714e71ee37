use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::background::BackgroundTasks;
use crate::bridge::BridgeConfig;
use crate::capability::Capability;
use crate::config::UpstreamConfig;
use crate::handlers::{self, problem_details};
use crate::session::{ChannelCapacity, SessionRegistry};
use crate::upstream::UpstreamClient;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub upstream: Arc<dyn UpstreamClient>,
    pub upstream_config: Arc<UpstreamConfig>,
    pub capacity: ChannelCapacity,
    /// Owner of published memory events.
    pub user_id: Arc<str>,
    pub keep_alive_interval_seconds: u64,
    pub background_tasks: BackgroundTasks,
}

impl AppState {
    /// Handshake config for `capability` carrying the configured default
    /// attributes. Callers layer request values on top.
    pub fn bridge_config(&self, capability: Capability) -> BridgeConfig {
        BridgeConfig::new(self.upstream_config.event_type(capability))
            .with_attributes(self.upstream_config.default_attributes.clone())
    }
}

// ============================================================================
// Server Setup
// ============================================================================

pub fn build_app(
    state: AppState,
    request_timeout_seconds: u64,
    static_path: Option<&Path>,
) -> Router {
    // Streaming routes: no request timeout, they live as long as the stream.
    let streaming_routes = Router::new()
        .route("/ws/transcribe", get(handlers::transcribe))
        .route("/api/translate/stream", get(handlers::stream_events))
        .route("/api/summarize/stream", get(handlers::stream_events))
        .route("/api/chat", post(handlers::chat))
        .route("/api/translate/run", post(handlers::run_translate))
        .route("/api/summarize/run", post(handlers::run_summarize))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/api/translate/start", post(handlers::start_translate))
        .route("/api/summarize/start", post(handlers::start_summarize))
        .route("/api/streams/{id}/send", post(handlers::send_to_stream))
        .route("/api/streams/{id}/commit", post(handlers::commit_stream))
        .route("/api/streams/{id}", delete(handlers::close_stream))
        .route("/api/health", get(handlers::health))
        .route("/livez", get(handlers::livez))
        .route("/version", get(handlers::version))
        .with_state(state)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_seconds),
        ));

    let mut app = Router::new()
        .merge(streaming_routes)
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024)); // 1 MB

    if let Some(root) = static_path {
        let root = root.to_path_buf();
        app = app.fallback(move |req: Request| spa_fallback(root.clone(), req));
    }

    app.layer(TraceLayer::new_for_http())
}

/// Serve `app` on `listener` until `signal` resolves.
///
/// Open streams keep their connections busy, so the registry is shut down as
/// soon as the signal fires. Every decoupled, one-shot and WebSocket bridge
/// hangs off its root token and ends, which lets the connections drain.
pub async fn serve<F>(
    listener: TcpListener,
    app: Router,
    registry: SessionRegistry,
    signal: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        signal.await;
        registry.shutdown();
    })
    .await
}

/// Serve a file from `root`, or `index.html` for client-side routes.
///
/// `/api/` and `/ws/` paths never fall back to the app shell.
async fn spa_fallback(root: PathBuf, req: Request) -> Response {
    let path = req.uri().path();
    if path.starts_with("/api/") || path.starts_with("/ws/") {
        return problem_details::not_found(format!("no route for {path}")).into_response();
    }

    let index = root.join("index.html");
    let serve = ServeDir::new(&root).fallback(ServeFile::new(index));
    match serve.oneshot(req).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}
