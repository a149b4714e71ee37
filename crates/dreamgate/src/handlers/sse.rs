//! Event-stream responses shared by the decoupled and one-shot adapters.
//!
//! Every stream opens with an `ok` comment, then carries one
//! `data: {"text": "<chunk>"}` event per outbound chunk, and ends when the
//! chunk stream ends.

use std::convert::Infallible;
use std::time::Duration;

use axum::http::HeaderName;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use tracing::warn;

use crate::api::ChunkEvent;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Wrap a chunk stream into an event-stream response.
pub fn chunk_stream_response<S>(chunks: S, keep_alive_interval_seconds: u64) -> Response
where
    S: Stream<Item = Bytes> + Send + 'static,
{
    let opening = stream::once(async { Ok::<_, Infallible>(Event::default().comment("ok")) });
    let events = chunks.filter_map(|chunk| async move { chunk_event(&chunk).map(Ok) });

    let sse = Sse::new(opening.chain(events)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(keep_alive_interval_seconds.max(1)))
            .text("keep-alive"),
    );

    ([(X_ACCEL_BUFFERING, "no")], sse).into_response()
}

fn chunk_event(chunk: &[u8]) -> Option<Event> {
    let payload = ChunkEvent {
        text: String::from_utf8_lossy(chunk).into_owned(),
    };
    match Event::default().json_data(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, "Failed to encode chunk event");
            None
        }
    }
}
