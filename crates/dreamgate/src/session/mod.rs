//! Decoupled streaming sessions.
//!
//! # Architecture
//!
//! ```text
//!  ┌─────────────────┐          ┌──────────────────────┐
//!  │ SessionRegistry │──owns──▶ │ Session              │
//!  │   (ID → Arc)    │          │  inbound  (Sender)   │──▶ bridge send pump
//!  └─────────────────┘          │  outbound (Receiver) │◀── bridge recv pump
//!                               │  cancel   (token)    │
//!                               └──────────▲───────────┘
//!                                          │ take / hand back
//!                               ┌──────────┴───────────┐
//!                               │ OutboundReader       │  (one event-stream reader)
//!                               └──────────────────────┘
//! ```
//!
//! - **Session**: the client-facing ends of one bridged conversation. Requests
//!   push into `inbound`, close it once on commit, and read `outbound`.
//! - **SessionPorts**: the bridge-facing ends, handed to [`crate::bridge::Bridge::run`].
//! - **SessionRegistry**: maps session IDs to sessions. Every session token is a
//!   child of the registry's root token so shutdown reaches all of them.
//! - **OutboundReader**: exclusive access to `outbound` for one reader. Dropping
//!   it early hands the queue back to the session.

mod entry;
mod reader;
mod registry;

pub use entry::{ChannelCapacity, SendError, Session, SessionPorts};
pub use reader::OutboundReader;
pub use registry::{SESSION_ID_PREFIX, SessionRegistry};
