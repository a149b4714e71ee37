//! Common test utilities.

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use tower::ServiceExt;

use dreamgate::server::{self, AppState};
use dreamgate::testing::{self, ScriptedUpstream};

/// Create a test `AppState` around a scripted upstream.
pub fn test_app_state(upstream: ScriptedUpstream) -> AppState {
    testing::app_state(upstream)
}

/// Create a test app for `state` without static assets.
pub fn test_app(state: &AppState) -> Router {
    server::build_app(state.clone(), 30, None)
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    app.clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: &Router, uri: &str, body: &str) -> Response<Body> {
    app.clone()
        .oneshot(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn post_empty(app: &Router, uri: &str) -> Response<Body> {
    app.clone()
        .oneshot(Request::post(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn delete(app: &Router, uri: &str) -> Response<Body> {
    app.clone()
        .oneshot(Request::delete(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// The `text` of every `data:` event in an event-stream body, in order.
pub fn data_texts(body: &str) -> Vec<String> {
    body.split("\n\n")
        .flat_map(|block| block.lines())
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| {
            let event: serde_json::Value = serde_json::from_str(data.trim()).unwrap();
            event["text"].as_str().unwrap().to_string()
        })
        .collect()
}

/// Start a decoupled stream and return its ID.
pub async fn start_stream(app: &Router, capability: &str, body: &str) -> String {
    let response = post_json(app, &format!("/api/{capability}/start"), body).await;
    assert_eq!(response.status(), 200);
    let json = body_json(response).await;
    json["streamId"].as_str().unwrap().to_string()
}
