//! Decoupled start/send/commit/close streams.
//!
//! `start` completes the upstream handshake before answering, so a stream ID
//! handed to a client always has a running bridge behind it. The bridge task
//! outlives the start request and stops when the session is cancelled or the
//! upstream stream ends.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path as PathExtract, Query, State};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::api::{OkResponse, SendRequest, StartRequest, StartResponse, StreamQuery, attrs};
use crate::bridge::{Bridge, BridgeConfig};
use crate::capability::Capability;
use crate::handlers::{problem_details, sse};
use crate::server::AppState;
use crate::session::{OutboundReader, SendError, SessionPorts};

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/translate/start
pub async fn start_translate(
    State(state): State<AppState>,
    body: Result<Json<StartRequest>, JsonRejection>,
) -> Response {
    start(state, Capability::Translate, body).await
}

/// POST /api/summarize/start
pub async fn start_summarize(
    State(state): State<AppState>,
    body: Result<Json<StartRequest>, JsonRejection>,
) -> Response {
    start(state, Capability::Summarize, body).await
}

/// GET /api/{translate,summarize}/stream?streamId=...
pub async fn stream_events(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Response {
    if query.stream_id.is_empty() {
        return problem_details::bad_request("streamId is required").into_response();
    }

    let Some(session) = state.registry.get(&query.stream_id) else {
        return problem_details::not_found(format!("stream '{}' not found", query.stream_id))
            .into_response();
    };

    let Some(reader) = OutboundReader::attach(&state.registry, session) else {
        return problem_details::conflict("stream already has a reader").into_response();
    };

    debug!(session_id = %reader.session_id(), "Streaming outbound events");
    sse::chunk_stream_response(reader.into_stream(), state.keep_alive_interval_seconds)
}

/// POST /api/streams/{id}/send
pub async fn send_to_stream(
    State(state): State<AppState>,
    PathExtract(id): PathExtract<String>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Response {
    let Some(session) = state.registry.get(&id) else {
        return problem_details::not_found(format!("stream '{id}' not found")).into_response();
    };

    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return problem_details::bad_request(rejection.body_text()).into_response(),
    };
    if req.text.is_empty() {
        return problem_details::bad_request("text must not be empty").into_response();
    }

    if session.is_cancelled() {
        return problem_details::conflict("stream is closed").into_response();
    }

    match session.try_send(Bytes::from(req.text)) {
        Ok(()) => Json(OkResponse::OK).into_response(),
        Err(SendError::Full) => {
            debug!(session_id = %id, "Inbound queue full");
            problem_details::too_many_requests("stream input queue is full, retry later")
                .into_response()
        }
        Err(SendError::Closed) => problem_details::conflict("stream is closed").into_response(),
    }
}

/// POST /api/streams/{id}/commit
///
/// Closes the stream's input. Repeated commits and unknown IDs are accepted.
pub async fn commit_stream(
    State(state): State<AppState>,
    PathExtract(id): PathExtract<String>,
) -> Json<OkResponse> {
    if let Some(session) = state.registry.get(&id)
        && session.commit()
    {
        debug!(session_id = %id, "Committed stream input");
    }
    Json(OkResponse::OK)
}

/// DELETE /api/streams/{id}
pub async fn close_stream(
    State(state): State<AppState>,
    PathExtract(id): PathExtract<String>,
) -> Json<OkResponse> {
    if state.registry.delete(&id) {
        info!(session_id = %id, "Closed stream");
    }
    Json(OkResponse::OK)
}

// ============================================================================
// Helpers
// ============================================================================

/// Handshake config for `capability` with the request's fields layered over
/// the configured defaults, and raw `attrs` over both.
pub(super) fn start_config(
    state: &AppState,
    capability: Capability,
    req: &StartRequest,
) -> BridgeConfig {
    let mode_fields = [
        (attrs::TARGET_LANG, req.target_lang.as_deref()),
        (attrs::MODE, req.mode.as_deref()),
        (attrs::SESSION_ID, req.session_id.as_deref()),
    ];

    state
        .bridge_config(capability)
        .with_attributes(
            mode_fields
                .into_iter()
                .filter_map(|(key, value)| value.filter(|v| !v.is_empty()).map(|v| (key, v))),
        )
        .with_attributes(req.attrs.clone())
}

async fn start(
    state: AppState,
    capability: Capability,
    body: Result<Json<StartRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return problem_details::bad_request(rejection.body_text()).into_response(),
    };

    let config = start_config(&state, capability, &req);
    let (session, ports) = state.registry.open(state.capacity);

    let bridge = match Bridge::connect(state.upstream.as_ref(), config, session.cancel_token()).await
    {
        Ok(bridge) => bridge,
        Err(e) => {
            warn!(%capability, error = %e, "Failed to start stream");
            session.close();
            return problem_details::bad_gateway(format!(
                "failed to connect to {capability} service: {e}"
            ))
            .into_response();
        }
    };

    state.registry.create(session.clone());
    info!(
        session_id = %session.id(),
        %capability,
        upstream_stream_id = %bridge.stream_id(),
        "Started stream"
    );

    let stream_id = session.id().to_string();
    let registry = state.registry.clone();
    tokio::spawn(async move {
        let SessionPorts { inbound, outbound } = ports;
        let cancel = session.cancel_token().clone();

        match bridge.run(inbound, outbound, cancel).await {
            Ok(()) => debug!(session_id = %session.id(), "Bridge finished"),
            Err(e) => warn!(session_id = %session.id(), error = %e, "Bridge failed"),
        }

        // A cancelled session has nothing left to read.
        if session.is_cancelled() {
            registry.delete_if_current(&session);
        }
    });

    Json(StartResponse { stream_id }).into_response()
}
