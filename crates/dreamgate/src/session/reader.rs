use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use futures::stream;
use tokio::sync::mpsc;
use tracing::debug;

use super::entry::Session;
use super::registry::SessionRegistry;

/// Exclusive reader of a session's outbound queue.
///
/// Observing the queue closed removes the session from the registry. Dropping
/// the reader before that hands the queue back so a later reader can resume.
pub struct OutboundReader {
    session: Arc<Session>,
    registry: SessionRegistry,
    rx: Option<mpsc::Receiver<Bytes>>,
}

impl OutboundReader {
    /// Attach to `session`. None if another reader is attached.
    pub fn attach(registry: &SessionRegistry, session: Arc<Session>) -> Option<Self> {
        let rx = session.take_outbound()?;
        debug!(session_id = %session.id(), "Reader attached");
        Some(Self {
            session,
            registry: registry.clone(),
            rx: Some(rx),
        })
    }

    pub fn session_id(&self) -> &str {
        self.session.id()
    }

    /// Next outbound chunk, or None once outbound is closed.
    pub async fn next(&mut self) -> Option<Bytes> {
        let rx = self.rx.as_mut()?;
        match rx.recv().await {
            Some(chunk) => Some(chunk),
            None => {
                self.rx = None;
                self.registry.delete_if_current(&self.session);
                None
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Bytes> + Send + 'static {
        stream::unfold(self, |mut reader| async move {
            let chunk = reader.next().await?;
            Some((chunk, reader))
        })
    }
}

impl Drop for OutboundReader {
    fn drop(&mut self) {
        if let Some(rx) = self.rx.take() {
            debug!(session_id = %self.session.id(), "Reader detached, handing outbound back");
            self.session.return_outbound(rx);
        }
    }
}
