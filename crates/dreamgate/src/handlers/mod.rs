//! HTTP and WebSocket request handlers.

mod health;
mod oneshot;
pub(crate) mod problem_details;
mod sse;
mod streams;
mod version;
mod ws;

pub use health::{health, livez};
pub use oneshot::{chat, run_summarize, run_translate};
pub use streams::{
    close_stream, commit_stream, send_to_stream, start_summarize, start_translate, stream_events,
};
pub use version::version;
pub use ws::{serve_transcription, transcribe};
