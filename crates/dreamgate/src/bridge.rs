//! Protocol bridge between a local channel pair and one upstream call.
//!
//! A bridge is set up in two steps:
//!
//! 1. [`Bridge::connect`] opens the upstream call, sends the config frame and
//!    waits for the ready acknowledgement. Any other first response, a transport
//!    error or cancellation fails setup.
//! 2. [`Bridge::run`] spawns the two pumps and waits for both to finish:
//!    - the **send pump** forwards inbound chunks as data frames and sends a
//!      single client-end frame once inbound is closed;
//!    - the **receive pump** forwards data frames onto outbound and closes
//!      outbound when the service ends the stream, fails it, or goes away.
//!
//! The first error reported by either pump is the bridge's result. A pump that
//! stops for good (receive side finished, or any failure) cancels its sibling.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::upstream::{ClientFrame, ServerFrame, UpstreamCall, UpstreamClient, UpstreamError};

// ============================================================================
// Types
// ============================================================================

/// Handshake parameters for one upstream call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeConfig {
    pub event_type: String,
    pub attributes: HashMap<String, String>,
}

impl BridgeConfig {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            attributes: HashMap::new(),
        }
    }

    /// Layer attributes over the current ones. Later layers win.
    #[must_use]
    pub fn with_attributes<I, K, V>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.attributes
            .extend(attributes.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to open upstream call: {0}")]
    Open(#[source] UpstreamError),

    #[error("handshake failed: {0}")]
    Handshake(#[source] UpstreamError),

    #[error("handshake failed: expected ready, got {0}")]
    UnexpectedResponse(&'static str),

    #[error("upstream closed before ready")]
    ClosedBeforeReady,

    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("upstream error {code}: {message}")]
    Upstream { code: i32, message: String },

    #[error("upstream transport error: {0}")]
    Transport(#[source] UpstreamError),
}

impl BridgeError {
    /// Whether this error happened before the bridge was established.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            Self::Open(_)
                | Self::Handshake(_)
                | Self::UnexpectedResponse(_)
                | Self::ClosedBeforeReady
                | Self::Timeout(_)
        )
    }
}

// ============================================================================
// Bridge
// ============================================================================

/// An upstream call that completed its handshake.
pub struct Bridge {
    stream_id: String,
    outgoing: mpsc::Sender<ClientFrame>,
    incoming: BoxStream<'static, Result<ServerFrame, UpstreamError>>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("stream_id", &self.stream_id)
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Open an upstream call and complete the config/ready handshake.
    ///
    /// Every wait races `cancel`. On failure the call is dropped, which
    /// releases it.
    pub async fn connect(
        upstream: &dyn UpstreamClient,
        config: BridgeConfig,
        cancel: &CancellationToken,
    ) -> Result<Self, BridgeError> {
        let UpstreamCall {
            outgoing,
            mut incoming,
        } = tokio::select! {
            _ = cancel.cancelled() => return Err(BridgeError::Cancelled),
            call = upstream.open() => call.map_err(BridgeError::Open)?,
        };

        let event_type = config.event_type.clone();
        let frame = ClientFrame::Config {
            event_type: config.event_type,
            attributes: config.attributes,
        };
        tokio::select! {
            _ = cancel.cancelled() => return Err(BridgeError::Cancelled),
            sent = outgoing.send(frame) => sent.map_err(|_| BridgeError::ClosedBeforeReady)?,
        }

        let first = tokio::select! {
            _ = cancel.cancelled() => return Err(BridgeError::Cancelled),
            first = incoming.next() => first,
        };

        match first {
            Some(Ok(ServerFrame::Ready { stream_id })) => {
                debug!(%event_type, upstream_stream_id = %stream_id, "Upstream stream ready");
                Ok(Self {
                    stream_id,
                    outgoing,
                    incoming,
                })
            }
            Some(Ok(other)) => Err(BridgeError::UnexpectedResponse(other.kind())),
            Some(Err(e)) => Err(BridgeError::Handshake(e)),
            None => Err(BridgeError::ClosedBeforeReady),
        }
    }

    /// Stream id assigned by the capability service.
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Pump chunks until the stream ends, fails, or `cancel` fires.
    ///
    /// `outbound` is closed when this returns. Returns the first error
    /// observed by either pump.
    pub async fn run(
        self,
        inbound: mpsc::Receiver<Bytes>,
        outbound: mpsc::Sender<Bytes>,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError> {
        let pumps = cancel.child_token();
        // Stops both pumps if this future is dropped mid-flight.
        let _guard = pumps.clone().drop_guard();

        let (errors_tx, mut errors_rx) = mpsc::channel(2);

        let send = tokio::spawn(send_pump(self.outgoing, inbound, pumps.clone()));
        let recv = tokio::spawn(recv_pump(
            self.incoming,
            outbound,
            pumps.clone(),
            errors_tx,
        ));

        for (name, handle) in [("send", send), ("recv", recv)] {
            if let Err(e) = handle.await {
                warn!(pump = name, error = %e, "Bridge pump panicked");
                pumps.cancel();
            }
        }

        match errors_rx.try_recv() {
            Ok(err) => Err(err),
            Err(_) => Ok(()),
        }
    }
}

// ============================================================================
// Pumps
// ============================================================================

async fn send_pump(
    outgoing: mpsc::Sender<ClientFrame>,
    mut inbound: mpsc::Receiver<Bytes>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            next = inbound.recv() => next,
        };

        let (frame, last) = match next {
            Some(chunk) => (ClientFrame::Data(chunk), false),
            None => (ClientFrame::ClientEnd, true),
        };

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            sent = outgoing.send(frame) => sent,
        };

        // A closed request half means the call is over. The receive pump
        // observes the reason.
        if sent.is_err() {
            debug!("Upstream request stream closed, stopping send pump");
            return;
        }

        if last {
            debug!("Inbound closed, sent client end");
            return;
        }
    }
}

async fn recv_pump(
    mut incoming: BoxStream<'static, Result<ServerFrame, UpstreamError>>,
    outbound: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    errors: mpsc::Sender<BridgeError>,
) {
    // Dropping `outbound` on return closes it.
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            next = incoming.next() => next,
        };

        match next {
            Some(Ok(ServerFrame::Data(chunk))) => {
                let delivered = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    delivered = outbound.send(chunk) => delivered,
                };
                if delivered.is_err() {
                    debug!("Outbound receiver dropped, stopping bridge");
                    cancel.cancel();
                    return;
                }
            }
            Some(Ok(ServerFrame::ServerEnd)) | None => {
                debug!("Upstream stream ended");
                cancel.cancel();
                return;
            }
            Some(Ok(ServerFrame::Error { code, message })) => {
                warn!(code, %message, "Upstream stream failed");
                let _ = errors.try_send(BridgeError::Upstream { code, message });
                cancel.cancel();
                return;
            }
            Some(Ok(ServerFrame::Ready { stream_id })) => {
                debug!(upstream_stream_id = %stream_id, "Ignoring repeated ready");
            }
            Some(Err(e)) => {
                warn!(error = %e, "Upstream transport failed");
                let _ = errors.try_send(BridgeError::Transport(e));
                cancel.cancel();
                return;
            }
        }
    }
}

// ============================================================================
// Liveness Probe
// ============================================================================

/// Run only the handshake and require ready within `timeout`.
///
/// Returns the stream id the service assigned. The call is released
/// immediately afterwards.
pub async fn check_ready(
    upstream: &dyn UpstreamClient,
    config: BridgeConfig,
    timeout: Duration,
) -> Result<String, BridgeError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    match tokio::time::timeout(timeout, Bridge::connect(upstream, config, &cancel)).await {
        Ok(Ok(bridge)) => Ok(bridge.stream_id),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(BridgeError::Timeout(timeout)),
    }
}

// ============================================================================
// Tests
// ============================================================================
