//! Event bus protocol types for communication between dreamgate and the
//! capability service.
//!
//! The capability service exposes one gRPC service, `pcas.bus.v1.EventBusService`,
//! with two methods:
//!
//! - **InteractStream** (bidirectional): the caller sends one [`StreamConfig`],
//!   then any number of [`StreamData`] chunks, then at most one client
//!   [`StreamEnd`]. The service answers with one [`StreamReady`], then any number
//!   of [`StreamData`] chunks, then either a server [`StreamEnd`] or a
//!   [`StreamError`].
//! - **Publish** (unary): fire a single [`Event`] onto the bus.
//!
//! Message types and the client are generated at build time from
//! `proto/pcas/bus/v1/bus.proto`.
//!
//! # Example: Handshake
//!
//! ```ignore
//! use dreamgate_protocol::{EventBusServiceClient, InteractRequest};
//!
//! let (tx, rx) = tokio::sync::mpsc::channel(16);
//! tx.send(InteractRequest::config("pcas.translate.v1", attributes)).await?;
//!
//! let mut client = EventBusServiceClient::connect("http://127.0.0.1:50051").await?;
//! let mut responses = client
//!     .interact_stream(tokio_stream::wrappers::ReceiverStream::new(rx))
//!     .await?
//!     .into_inner();
//! let ready = responses.message().await?;
//! ```

// Include the generated protobuf code
tonic::include_proto!("pcas.bus.v1");

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use prost_types::Timestamp;

pub use event_bus_service_client::EventBusServiceClient;

// ============================================================================
// Constants
// ============================================================================

/// CloudEvents spec version stamped on published events.
pub const EVENT_SPEC_VERSION: &str = "1.0";

/// Event type for memories derived from a transcript.
pub const MEMORY_EVENT_TYPE: &str = "pcas.memory.create.v1";

// ============================================================================
// Constructors
// ============================================================================

impl InteractRequest {
    /// Build the opening config message.
    pub fn config(event_type: impl Into<String>, attributes: HashMap<String, String>) -> Self {
        Self {
            request_type: Some(interact_request::RequestType::Config(StreamConfig {
                event_type: event_type.into(),
                attributes,
            })),
        }
    }

    /// Build a data message carrying `content`.
    pub fn data(content: impl Into<Vec<u8>>) -> Self {
        Self {
            request_type: Some(interact_request::RequestType::Data(StreamData {
                content: content.into(),
            })),
        }
    }

    /// Build the client half-close message.
    pub fn client_end() -> Self {
        Self {
            request_type: Some(interact_request::RequestType::ClientEnd(StreamEnd {})),
        }
    }
}

impl Event {
    /// Build a memory event whose subject is `text`.
    pub fn memory(
        id: impl Into<String>,
        source: impl Into<String>,
        text: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            specversion: EVENT_SPEC_VERSION.to_string(),
            r#type: MEMORY_EVENT_TYPE.to_string(),
            subject: text.into(),
            time: Some(datetime_to_timestamp(Utc::now())),
            user_id: user_id.into(),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Convert a chrono timestamp to a protobuf timestamp.
pub fn datetime_to_timestamp(dt: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: dt.timestamp(),
        nanos: dt.timestamp_subsec_nanos() as i32,
    }
}

// ============================================================================
// Tests
// ============================================================================
