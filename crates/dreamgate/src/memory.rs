//! Memory events derived from transcript text.
//!
//! A [`MemoryTap`] watches the text flowing back to a transcription client.
//! Each time its [`Distiller`] completes a sentence, the sentence is published
//! to the event bus as a memory event. Publishing runs on the background task
//! registry and never blocks or fails the transcript stream.

use std::sync::Arc;

use tracing::{debug, warn};
use ulid::Ulid;

use dreamgate_protocol::Event;

use crate::background::BackgroundTasks;
use crate::distiller::Distiller;
use crate::upstream::UpstreamClient;

/// Source URI stamped on memory events.
pub const MEMORY_EVENT_SOURCE: &str = "/d-app/dreamgate";

/// Per-connection sentence tap that publishes memory events.
pub struct MemoryTap {
    distiller: Distiller,
    upstream: Arc<dyn UpstreamClient>,
    user_id: String,
    tasks: BackgroundTasks,
}

impl MemoryTap {
    pub fn new(
        upstream: Arc<dyn UpstreamClient>,
        user_id: impl Into<String>,
        tasks: BackgroundTasks,
    ) -> Self {
        Self {
            distiller: Distiller::new(),
            upstream,
            user_id: user_id.into(),
            tasks,
        }
    }

    /// Feed one outbound chunk. Non-UTF-8 bytes are replaced before segmenting.
    pub fn observe(&self, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk);
        let Some(sentence) = self.distiller.process(&text) else {
            return;
        };

        let event = Event::memory(
            format!("mem_{}", Ulid::new()),
            MEMORY_EVENT_SOURCE,
            sentence,
            self.user_id.clone(),
        );
        let upstream = self.upstream.clone();

        self.tasks.spawn(async move {
            let id = event.id.clone();
            match upstream.publish(event).await {
                Ok(()) => debug!(event_id = %id, "Published memory event"),
                Err(e) => warn!(event_id = %id, error = %e, "Failed to publish memory event"),
            }
        });
    }

    /// Discard text that never reached a terminator. Returns its length in bytes.
    pub fn finish(&self) -> usize {
        let rest = self.distiller.take_pending();
        if !rest.is_empty() {
            debug!(bytes = rest.len(), "Discarding unterminated transcript text");
        }
        rest.len()
    }
}
