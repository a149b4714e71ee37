use std::collections::BTreeMap;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use futures::future::join_all;
use tracing::debug;

use crate::api::{HealthResponse, ProbeStatus, UpstreamHealth, attrs};
use crate::bridge::check_ready;
use crate::capability::Capability;
use crate::server::AppState;

pub async fn livez() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// GET /api/health
///
/// Runs the ready handshake for every capability concurrently. The report is
/// always 200; a failing capability shows up as `ok: false`.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let timeout = state.upstream_config.probe_timeout();

    let probes = Capability::ALL.map(|capability| {
        let config = state
            .bridge_config(capability)
            .with_attributes([(attrs::PROBE, "true")]);
        let upstream = state.upstream.clone();

        async move {
            let status = match check_ready(upstream.as_ref(), config, timeout).await {
                Ok(stream_id) => {
                    debug!(%capability, upstream_stream_id = %stream_id, "Probe ready");
                    ProbeStatus {
                        ok: true,
                        error: None,
                    }
                }
                Err(e) => {
                    debug!(%capability, error = %e, "Probe failed");
                    ProbeStatus {
                        ok: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            (capability.name().to_string(), status)
        }
    });

    let capabilities: BTreeMap<_, _> = join_all(probes).await.into_iter().collect();

    Json(HealthResponse {
        server: "ok".to_string(),
        upstream: UpstreamHealth {
            address: state.upstream_config.address.clone(),
            capabilities,
        },
    })
}
