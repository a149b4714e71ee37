//! Request and response bodies of the HTTP surface.
//!
//! Field names follow the browser client's camelCase convention.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

// ============================================================================
// Attribute Keys
// ============================================================================

/// Upstream attribute names filled from mode-specific request fields.
pub mod attrs {
    pub const TARGET_LANG: &str = "target_lang";
    pub const MODE: &str = "mode";
    pub const SESSION_ID: &str = "session_id";
    pub const PROBE: &str = "probe";
}

// ============================================================================
// Decoupled Streams
// ============================================================================

/// Body of `POST /api/{translate,summarize}/start`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StartRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Translate only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_lang: Option<String>,
    /// Summarize only: `rolling` or `final`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Raw upstream attributes. Override everything else.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub attrs: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub stream_id: String,
}

/// Query of `GET /api/{translate,summarize}/stream`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamQuery {
    pub stream_id: String,
}

/// Body of `POST /api/streams/{id}/send`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SendRequest {
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub const OK: OkResponse = OkResponse { ok: true };
}

// ============================================================================
// One-shot Streams
// ============================================================================

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub attrs: HashMap<String, String>,
}

/// Body of `POST /api/{translate,summarize}/run`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunRequest {
    pub text: String,
    #[serde(flatten)]
    pub start: StartRequest,
}

// ============================================================================
// Event Stream Payloads
// ============================================================================

/// Payload of one `data:` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEvent {
    pub text: String,
}

// ============================================================================
// Diagnostics
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub server: String,
    pub upstream: UpstreamHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamHealth {
    pub address: String,
    /// Probe result per capability name.
    #[serde(flatten)]
    pub capabilities: BTreeMap<String, ProbeStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeStatus {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_request_accepts_camel_case() {
        let req: StartRequest = serde_json::from_str(
            r#"{"sessionId":"s1","targetLang":"en","attrs":{"tone":"formal"}}"#,
        )
        .unwrap();
        assert_eq!(req.session_id.as_deref(), Some("s1"));
        assert_eq!(req.target_lang.as_deref(), Some("en"));
        assert_eq!(req.attrs["tone"], "formal");
    }

    #[test]
    fn run_request_flattens_start_fields() {
        let req: RunRequest =
            serde_json::from_str(r#"{"text":"ola","targetLang":"en"}"#).unwrap();
        assert_eq!(req.text, "ola");
        assert_eq!(req.start.target_lang.as_deref(), Some("en"));
    }

    #[test]
    fn health_flattens_capabilities() {
        let health = HealthResponse {
            server: "ok".to_string(),
            upstream: UpstreamHealth {
                address: "http://127.0.0.1:50051".to_string(),
                capabilities: BTreeMap::from([
                    (
                        "chat".to_string(),
                        ProbeStatus {
                            ok: true,
                            error: None,
                        },
                    ),
                    (
                        "translate".to_string(),
                        ProbeStatus {
                            ok: false,
                            error: Some("timed out".to_string()),
                        },
                    ),
                ]),
            },
        };
        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["upstream"]["chat"]["ok"], true);
        assert!(json["upstream"]["chat"].get("error").is_none());
        assert_eq!(json["upstream"]["translate"]["error"], "timed out");
        assert_eq!(json["upstream"]["address"], "http://127.0.0.1:50051");
    }
}
