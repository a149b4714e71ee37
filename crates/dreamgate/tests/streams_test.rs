//! Integration tests for decoupled start/send/commit/close streams.

use std::collections::HashMap;

use axum::http::{StatusCode, header};
use bytes::Bytes;

use dreamgate::session::{ChannelCapacity, SESSION_ID_PREFIX};
use dreamgate::testing::{ScriptedUpstream, Step};
use dreamgate::upstream::ClientFrame;

mod common;

use common::*;

// ============================================================================
// Full Round Trip
// ============================================================================

#[tokio::test]
async fn start_send_commit_stream_round_trip() {
    let upstream = ScriptedUpstream::new(vec![Step::Ready, Step::Echo, Step::ServerEnd]);
    let state = test_app_state(upstream.clone());
    let app = test_app(&state);

    let id = start_stream(&app, "translate", r#"{"targetLang":"en"}"#).await;
    assert!(id.starts_with(SESSION_ID_PREFIX));
    assert!(state.registry.contains(&id));

    let response = post_json(&app, &format!("/api/streams/{id}/send"), r#"{"text":"ola"}"#).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["ok"], true);

    let response = post_empty(&app, &format!("/api/streams/{id}/commit")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&app, &format!("/api/translate/stream?streamId={id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
    assert_eq!(response.headers().get("x-accel-buffering").unwrap(), "no");

    let body = body_string(response).await;
    assert!(body.starts_with(':'));
    assert_eq!(data_texts(&body), vec!["ola"]);

    // Reading to the end removed the session.
    assert!(!state.registry.contains(&id));
    let response = post_json(&app, &format!("/api/streams/{id}/send"), r#"{"text":"late"}"#).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert_eq!(
        upstream.sent_frames(),
        vec![
            ClientFrame::Config {
                event_type: "pcas.translate.stream.v1".to_string(),
                attributes: HashMap::from([
                    ("source".to_string(), "dreamgate".to_string()),
                    ("target_lang".to_string(), "en".to_string()),
                ]),
            },
            ClientFrame::Data(Bytes::from_static(b"ola")),
            ClientFrame::ClientEnd,
        ]
    );
}

#[tokio::test]
async fn summarize_mode_reaches_upstream() {
    let upstream = ScriptedUpstream::new(vec![Step::Ready, Step::Hang]);
    let state = test_app_state(upstream.clone());
    let app = test_app(&state);

    start_stream(
        &app,
        "summarize",
        r#"{"mode":"rolling","sessionId":"s-42","attrs":{"source":"kiosk"}}"#,
    )
    .await;

    let frames = upstream.sent_frames();
    let ClientFrame::Config {
        event_type,
        attributes,
    } = &frames[0]
    else {
        panic!("first frame must be the config");
    };
    assert_eq!(event_type, "pcas.summarize.stream.v1");
    assert_eq!(attributes["mode"], "rolling");
    assert_eq!(attributes["session_id"], "s-42");
    assert_eq!(attributes["source"], "kiosk");
}

#[tokio::test]
async fn commit_and_close_are_idempotent() {
    let upstream = ScriptedUpstream::new(vec![Step::Ready, Step::AwaitClientEnd, Step::Hang]);
    let state = test_app_state(upstream.clone());
    let app = test_app(&state);

    let id = start_stream(&app, "translate", "{}").await;

    for _ in 0..3 {
        let response = post_empty(&app, &format!("/api/streams/{id}/commit")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    for _ in 0..2 {
        let response = delete(&app, &format!("/api/streams/{id}")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = post_empty(&app, &format!("/api/streams/{id}/commit")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let client_ends = upstream
        .sent_frames()
        .into_iter()
        .filter(|f| *f == ClientFrame::ClientEnd)
        .count();
    assert!(client_ends <= 1);
    assert!(!state.registry.contains(&id));
}

// ============================================================================
// Send Outcomes
// ============================================================================

#[tokio::test]
async fn send_to_unknown_stream_is_not_found() {
    let state = test_app_state(ScriptedUpstream::new(Vec::new()));
    let app = test_app(&state);

    let response = post_json(&app, "/api/streams/stream_missing/send", r#"{"text":"x"}"#).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/problem+json"
    );
    assert_eq!(body_json(response).await["status"], 404);
}

#[tokio::test]
async fn send_after_commit_conflicts() {
    let state = test_app_state(ScriptedUpstream::new(vec![Step::Ready, Step::Hang]));
    let app = test_app(&state);

    let id = start_stream(&app, "translate", "{}").await;
    post_empty(&app, &format!("/api/streams/{id}/commit")).await;

    let response = post_json(&app, &format!("/api/streams/{id}/send"), r#"{"text":"x"}"#).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn send_rejects_empty_text_and_bad_json() {
    let state = test_app_state(ScriptedUpstream::new(vec![Step::Ready, Step::Hang]));
    let app = test_app(&state);
    let id = start_stream(&app, "translate", "{}").await;

    let response = post_json(&app, &format!("/api/streams/{id}/send"), r#"{"text":""}"#).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json(&app, &format!("/api/streams/{id}/send"), "not json").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn send_when_queue_full_is_too_many_requests() {
    // The fake service never reads, so the bridge stops draining input.
    let mut state = test_app_state(ScriptedUpstream::new(vec![Step::Ready, Step::Hang]));
    state.capacity = ChannelCapacity {
        inbound: 1,
        outbound: 1,
    };
    let app = test_app(&state);
    let id = start_stream(&app, "translate", "{}").await;

    let mut accepted = 0;
    let mut rejected = None;
    for i in 0..64 {
        let body = format!(r#"{{"text":"chunk-{i}"}}"#);
        let response = post_json(&app, &format!("/api/streams/{id}/send"), &body).await;
        match response.status() {
            StatusCode::OK => accepted += 1,
            status => {
                rejected = Some((status, body_json(response).await));
                break;
            }
        }
    }

    let (status, problem) = rejected.expect("input queue never filled up");
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(problem["status"], 429);
    assert!(accepted >= 1);

    // Still open: the condition is recoverable.
    assert!(state.registry.contains(&id));
}

// ============================================================================
// Event Stream Readers
// ============================================================================

#[tokio::test]
async fn stream_for_unknown_id_is_not_found() {
    let state = test_app_state(ScriptedUpstream::new(Vec::new()));
    let app = test_app(&state);

    let response = get(&app, "/api/summarize/stream?streamId=stream_missing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(&app, "/api/summarize/stream").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn second_reader_conflicts_until_first_leaves() {
    let state = test_app_state(ScriptedUpstream::new(vec![Step::Ready, Step::Hang]));
    let app = test_app(&state);
    let id = start_stream(&app, "translate", "{}").await;
    let uri = format!("/api/translate/stream?streamId={id}");

    let first = get(&app, &uri).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = get(&app, &uri).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);

    drop(first);
    let third = get(&app, &uri).await;
    assert_eq!(third.status(), StatusCode::OK);
}

#[tokio::test]
async fn close_ends_open_reader_and_removes_session() {
    let state = test_app_state(ScriptedUpstream::new(vec![Step::Ready, Step::Hang]));
    let app = test_app(&state);
    let id = start_stream(&app, "summarize", "{}").await;

    let reader = get(&app, &format!("/api/summarize/stream?streamId={id}")).await;
    assert_eq!(reader.status(), StatusCode::OK);

    let response = delete(&app, &format!("/api/streams/{id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!state.registry.contains(&id));

    // Cancellation stops the bridge, which closes outbound.
    let body = body_string(reader).await;
    assert!(data_texts(&body).is_empty());
}

#[tokio::test]
async fn upstream_error_ends_stream_after_partial_output() {
    let state = test_app_state(ScriptedUpstream::new(vec![
        Step::Ready,
        Step::Data("partial"),
        Step::Error(13, "model crashed"),
        Step::Data("never sent"),
    ]));
    let app = test_app(&state);
    let id = start_stream(&app, "translate", "{}").await;

    let body = body_string(get(&app, &format!("/api/translate/stream?streamId={id}")).await).await;
    assert_eq!(data_texts(&body), vec!["partial"]);
    assert!(state.registry.is_empty());
}

// ============================================================================
// Setup Failures
// ============================================================================

#[tokio::test]
async fn start_fails_with_bad_gateway_when_upstream_is_down() {
    let state = test_app_state(ScriptedUpstream::unavailable());
    let app = test_app(&state);

    let response = post_json(&app, "/api/translate/start", r#"{"targetLang":"en"}"#).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["status"], 502);
    assert!(state.registry.is_empty());
}

#[tokio::test]
async fn start_fails_when_service_skips_ready() {
    let state = test_app_state(ScriptedUpstream::new(vec![Step::Data("hello?")]));
    let app = test_app(&state);

    let response = post_json(&app, "/api/summarize/start", "{}").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(state.registry.is_empty());
}

#[tokio::test]
async fn start_rejects_malformed_body() {
    let state = test_app_state(ScriptedUpstream::new(vec![Step::Ready]));
    let app = test_app(&state);

    let response = post_json(&app, "/api/translate/start", "{").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/problem+json"
    );
}
