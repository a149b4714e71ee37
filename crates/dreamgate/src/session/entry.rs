// std::sync::Mutex is correct here: no lock is held across an .await point.
use std::sync::Mutex;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

/// Queue sizes for a session's channel pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCapacity {
    pub inbound: usize,
    pub outbound: usize,
}

impl Default for ChannelCapacity {
    fn default() -> Self {
        Self {
            inbound: 16,
            outbound: 16,
        }
    }
}

/// Why a chunk was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("stream input is closed")]
    Closed,

    #[error("stream input queue is full")]
    Full,
}

/// Bridge-facing ends of a session's channel pair.
#[derive(Debug)]
pub struct SessionPorts {
    pub inbound: mpsc::Receiver<Bytes>,
    pub outbound: mpsc::Sender<Bytes>,
}

/// Client-facing state of one bridged conversation.
#[derive(Debug)]
pub struct Session {
    id: String,
    inbound: Mutex<Option<mpsc::Sender<Bytes>>>,
    outbound: Mutex<Option<mpsc::Receiver<Bytes>>>,
    cancel: CancellationToken,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Create a session and the matching bridge ports.
    pub fn new(
        id: impl Into<String>,
        capacity: ChannelCapacity,
        cancel: CancellationToken,
    ) -> (Self, SessionPorts) {
        let (in_tx, in_rx) = mpsc::channel(capacity.inbound.max(1));
        let (out_tx, out_rx) = mpsc::channel(capacity.outbound.max(1));

        let session = Self {
            id: id.into(),
            inbound: Mutex::new(Some(in_tx)),
            outbound: Mutex::new(Some(out_rx)),
            cancel,
            created_at: Utc::now(),
        };
        let ports = SessionPorts {
            inbound: in_rx,
            outbound: out_tx,
        };
        (session, ports)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    // ------------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------------

    /// Queue one chunk without waiting.
    pub fn try_send(&self, chunk: Bytes) -> Result<(), SendError> {
        let guard = self.inbound.lock().expect("mutex poisoned");
        let Some(tx) = guard.as_ref() else {
            return Err(SendError::Closed);
        };
        tx.try_send(chunk).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Full,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Close inbound. Returns false if it was already closed.
    pub fn commit(&self) -> bool {
        self.inbound.lock().expect("mutex poisoned").take().is_some()
    }

    pub fn is_committed(&self) -> bool {
        self.inbound.lock().expect("mutex poisoned").is_none()
    }

    /// Cancel the session and close inbound.
    pub fn close(&self) {
        self.cancel.cancel();
        self.commit();
    }

    // ------------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------------

    /// Take exclusive ownership of outbound. None while another reader holds it.
    pub(crate) fn take_outbound(&self) -> Option<mpsc::Receiver<Bytes>> {
        self.outbound.lock().expect("mutex poisoned").take()
    }

    /// Hand outbound back after a reader detached early.
    pub(crate) fn return_outbound(&self, rx: mpsc::Receiver<Bytes>) {
        *self.outbound.lock().expect("mutex poisoned") = Some(rx);
    }
}
