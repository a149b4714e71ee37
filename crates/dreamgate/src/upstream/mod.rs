//! Upstream capability service client.
//!
//! The bridge talks to the capability service through the [`UpstreamClient`]
//! trait. An opened call is a pair of halves: a bounded sender for
//! [`ClientFrame`]s and a stream of [`ServerFrame`]s. Dropping both halves
//! releases the call.
//!
//! [`GrpcUpstream`] is the production implementation over tonic.

mod grpc;

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio::sync::mpsc;

use dreamgate_protocol::Event;

pub use grpc::GrpcUpstream;

// ============================================================================
// Frames
// ============================================================================

/// A message from dreamgate to the capability service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// Opens the stream with an event type and attributes.
    Config {
        event_type: String,
        attributes: HashMap<String, String>,
    },
    /// One payload chunk.
    Data(Bytes),
    /// Half-close: no more data follows.
    ClientEnd,
}

/// A message from the capability service to dreamgate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// Handshake acknowledgement.
    Ready { stream_id: String },
    /// One result chunk.
    Data(Bytes),
    /// The service finished the stream normally.
    ServerEnd,
    /// The service failed the stream.
    Error { code: i32, message: String },
}

impl ServerFrame {
    /// Short name of the frame kind, for logs and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Data(_) => "data",
            Self::ServerEnd => "server_end",
            Self::Error { .. } => "error",
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid upstream address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("upstream call failed: {0}")]
    Status(#[from] tonic::Status),

    #[error("upstream sent an empty response")]
    EmptyResponse,
}

// ============================================================================
// Client Trait
// ============================================================================

/// An opened bidirectional call.
pub struct UpstreamCall {
    /// Request half. Dropping it ends the request stream.
    pub outgoing: mpsc::Sender<ClientFrame>,
    /// Response half. Dropping it cancels the call.
    pub incoming: BoxStream<'static, Result<ServerFrame, UpstreamError>>,
}

impl std::fmt::Debug for UpstreamCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamCall").finish_non_exhaustive()
    }
}

/// Connection to the capability service.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Open a new bidirectional interaction call.
    async fn open(&self) -> Result<UpstreamCall, UpstreamError>;

    /// Publish a single event onto the bus.
    async fn publish(&self, event: Event) -> Result<(), UpstreamError>;
}
