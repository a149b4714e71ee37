//! In-memory capability service for tests.
//!
//! [`ScriptedUpstream`] plays a fixed script of [`Step`]s on every call it
//! opens and records every frame it receives and every event published to it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use tokio::sync::mpsc;

use dreamgate_protocol::Event;

use crate::background::BackgroundTasks;
use crate::config::UpstreamConfig;
use crate::server::AppState;
use crate::session::{ChannelCapacity, SessionRegistry};
use crate::upstream::{ClientFrame, ServerFrame, UpstreamCall, UpstreamClient, UpstreamError};

/// Application state wired to `upstream` with default configuration.
pub fn app_state(upstream: ScriptedUpstream) -> AppState {
    AppState {
        registry: SessionRegistry::new(),
        upstream: Arc::new(upstream),
        upstream_config: Arc::new(UpstreamConfig::default()),
        capacity: ChannelCapacity::default(),
        user_id: Arc::from("test-user"),
        keep_alive_interval_seconds: 15,
        background_tasks: BackgroundTasks::new(),
    }
}

/// One scripted action of the fake service.
#[derive(Debug, Clone)]
pub enum Step {
    /// Read the config frame and answer with ready.
    Ready,
    /// Emit one data frame.
    Data(&'static str),
    /// Echo every data frame received until client end.
    Echo,
    /// Read frames until client end without answering.
    AwaitClientEnd,
    /// Emit server end.
    ServerEnd,
    /// Emit an error frame.
    Error(i32, &'static str),
    /// Never respond again.
    Hang,
}

#[derive(Debug, Default)]
struct Recorded {
    frames: Mutex<Vec<ClientFrame>>,
    published: Mutex<Vec<Event>>,
}

/// Fake upstream that replays a script per call.
#[derive(Debug, Clone)]
pub struct ScriptedUpstream {
    script: Vec<Step>,
    unavailable: bool,
    opened: Arc<AtomicUsize>,
    recorded: Arc<Recorded>,
}

impl ScriptedUpstream {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script,
            unavailable: false,
            opened: Arc::new(AtomicUsize::new(0)),
            recorded: Arc::new(Recorded::default()),
        }
    }

    /// An upstream that refuses every call.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new(Vec::new())
        }
    }

    /// Frames received so far, across all calls, in arrival order.
    pub fn sent_frames(&self) -> Vec<ClientFrame> {
        self.recorded.frames.lock().expect("mutex poisoned").clone()
    }

    /// Events published so far.
    pub fn published(&self) -> Vec<Event> {
        self.recorded.published.lock().expect("mutex poisoned").clone()
    }

    /// Number of calls opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

struct Playback {
    steps: std::vec::IntoIter<Step>,
    echoing: bool,
    frames: mpsc::Receiver<ClientFrame>,
    recorded: Arc<Recorded>,
    stream_id: String,
}

impl Playback {
    async fn receive(&mut self) -> Option<ClientFrame> {
        let frame = self.frames.recv().await?;
        self.recorded
            .frames
            .lock()
            .expect("mutex poisoned")
            .push(frame.clone());
        Some(frame)
    }

    async fn next_frame(&mut self) -> Option<Result<ServerFrame, UpstreamError>> {
        loop {
            if self.echoing {
                match self.receive().await {
                    Some(ClientFrame::Data(chunk)) => return Some(Ok(ServerFrame::Data(chunk))),
                    Some(_) => continue,
                    None => {
                        self.echoing = false;
                        continue;
                    }
                }
            }

            match self.steps.next()? {
                Step::Ready => {
                    self.receive().await;
                    return Some(Ok(ServerFrame::Ready {
                        stream_id: self.stream_id.clone(),
                    }));
                }
                Step::Data(text) => return Some(Ok(ServerFrame::Data(Bytes::from(text)))),
                Step::Echo => self.echoing = true,
                Step::AwaitClientEnd => loop {
                    match self.receive().await {
                        Some(ClientFrame::ClientEnd) | None => break,
                        Some(_) => {}
                    }
                },
                Step::ServerEnd => return Some(Ok(ServerFrame::ServerEnd)),
                Step::Error(code, message) => {
                    return Some(Ok(ServerFrame::Error {
                        code,
                        message: message.to_string(),
                    }));
                }
                Step::Hang => std::future::pending::<()>().await,
            }
        }
    }
}

#[async_trait]
impl UpstreamClient for ScriptedUpstream {
    async fn open(&self) -> Result<UpstreamCall, UpstreamError> {
        if self.unavailable {
            return Err(UpstreamError::Status(tonic::Status::unavailable(
                "connection refused",
            )));
        }

        let n = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        let (outgoing, frames) = mpsc::channel(8);
        let playback = Playback {
            steps: self.script.clone().into_iter(),
            echoing: false,
            frames,
            recorded: self.recorded.clone(),
            stream_id: format!("upstream-{n}"),
        };

        let incoming = stream::unfold(playback, |mut playback| async move {
            let frame = playback.next_frame().await?;
            Some((frame, playback))
        })
        .boxed();

        Ok(UpstreamCall { outgoing, incoming })
    }

    async fn publish(&self, event: Event) -> Result<(), UpstreamError> {
        if self.unavailable {
            return Err(UpstreamError::Status(tonic::Status::unavailable(
                "connection refused",
            )));
        }
        self.recorded
            .published
            .lock()
            .expect("mutex poisoned")
            .push(event);
        Ok(())
    }
}
