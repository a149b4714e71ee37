//! One-shot streams: one request, one chunk, one streamed response.
//!
//! The bridge is scoped to the request. The chunk is queued and input closed
//! right away, then outbound is relayed as an event stream. A client that goes
//! away drops the response body, which cancels the bridge.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::{ChatRequest, RunRequest, attrs};
use crate::bridge::{Bridge, BridgeConfig};
use crate::capability::Capability;
use crate::handlers::streams::start_config;
use crate::handlers::{problem_details, sse};
use crate::server::AppState;

/// POST /api/chat
pub async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return problem_details::bad_request(rejection.body_text()).into_response(),
    };
    if req.message.trim().is_empty() {
        return problem_details::bad_request("message must not be empty").into_response();
    }

    let session_id = req.session_id.filter(|id| !id.is_empty());
    let config = state
        .bridge_config(Capability::Chat)
        .with_attributes(session_id.map(|id| (attrs::SESSION_ID, id)))
        .with_attributes(req.attrs);

    run_oneshot(&state, Capability::Chat, config, req.message).await
}

/// POST /api/translate/run
pub async fn run_translate(
    State(state): State<AppState>,
    body: Result<Json<RunRequest>, JsonRejection>,
) -> Response {
    run(state, Capability::Translate, body).await
}

/// POST /api/summarize/run
pub async fn run_summarize(
    State(state): State<AppState>,
    body: Result<Json<RunRequest>, JsonRejection>,
) -> Response {
    run(state, Capability::Summarize, body).await
}

async fn run(
    state: AppState,
    capability: Capability,
    body: Result<Json<RunRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return problem_details::bad_request(rejection.body_text()).into_response(),
    };
    if req.text.trim().is_empty() {
        return problem_details::bad_request("text must not be empty").into_response();
    }

    let config = start_config(&state, capability, &req.start);
    run_oneshot(&state, capability, config, req.text).await
}

async fn run_oneshot(
    state: &AppState,
    capability: Capability,
    config: BridgeConfig,
    text: String,
) -> Response {
    let cancel = state.registry.child_token();

    let bridge = match Bridge::connect(state.upstream.as_ref(), config, &cancel).await {
        Ok(bridge) => bridge,
        Err(e) => {
            warn!(%capability, error = %e, "Failed to start one-shot stream");
            return problem_details::bad_gateway(format!(
                "failed to connect to {capability} service: {e}"
            ))
            .into_response();
        }
    };
    debug!(%capability, upstream_stream_id = %bridge.stream_id(), "Started one-shot stream");

    // Auto-commit: the only chunk is queued and the sender dropped.
    let (inbound_tx, inbound_rx) = mpsc::channel(1);
    let (outbound_tx, outbound_rx) = mpsc::channel(state.capacity.outbound.max(1));
    if inbound_tx.try_send(Bytes::from(text)).is_err() {
        warn!(%capability, "One-shot input rejected");
    }
    drop(inbound_tx);

    let run_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = bridge.run(inbound_rx, outbound_tx, run_cancel).await {
            warn!(%capability, error = %e, "One-shot bridge failed");
        }
    });

    // The guard travels with the body; dropping the body cancels the bridge.
    let chunks = stream::unfold(
        (outbound_rx, cancel.drop_guard()),
        |(mut rx, guard)| async move {
            let chunk = rx.recv().await?;
            Some((chunk, (rx, guard)))
        },
    );

    sse::chunk_stream_response(chunks, state.keep_alive_interval_seconds)
}
