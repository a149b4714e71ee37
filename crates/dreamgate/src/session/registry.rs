//! Session registry for decoupled streams.
//!
//! The registry is responsible for:
//! - Allocating session IDs and channel pairs
//! - Looking up live sessions
//! - Removing sessions on explicit close or adapter cleanup
//! - Cancelling every session on shutdown

use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use ulid::Ulid;

use super::entry::{ChannelCapacity, Session, SessionPorts};

/// Prefix for decoupled stream IDs.
pub const SESSION_ID_PREFIX: &str = "stream_";

// ============================================================================
// Session Registry
// ============================================================================

/// Registry of decoupled sessions.
///
/// Thread-safe and cheap to clone. Sessions are never evicted by time.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, Arc<Session>>>,
    /// Parent of every session token.
    root: CancellationToken,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            root: CancellationToken::new(),
        }
    }

    /// Cancel every session and clear the registry.
    pub fn shutdown(&self) {
        let count = self.sessions.len();
        info!(sessions = count, "Shutting down session registry");

        self.root.cancel();
        // Collect first so no shard lock is held while closing.
        let sessions: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for session in sessions {
            session.close();
        }
        self.sessions.clear();
    }

    /// Token for a bridge that lives outside the registry.
    ///
    /// WebSocket and one-shot streams use it so [`SessionRegistry::shutdown`]
    /// reaches them too.
    pub fn child_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    // ------------------------------------------------------------------------
    // Core API
    // ------------------------------------------------------------------------

    /// Allocate a new, unregistered session.
    ///
    /// The session becomes visible only after [`SessionRegistry::create`], so
    /// a session whose setup fails never enters the registry.
    pub fn open(&self, capacity: ChannelCapacity) -> (Arc<Session>, SessionPorts) {
        let id = format!("{}{}", SESSION_ID_PREFIX, Ulid::new());
        let (session, ports) = Session::new(id, capacity, self.root.child_token());
        (Arc::new(session), ports)
    }

    /// Register a session under its ID.
    pub fn create(&self, session: Arc<Session>) {
        debug!(session_id = %session.id(), "Registered session");
        self.sessions.insert(session.id().to_string(), session);
    }

    /// Get a session by ID.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|r| r.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Close and remove a session.
    ///
    /// Returns true if a session was removed. Unknown IDs are ignored.
    pub fn delete(&self, id: &str) -> bool {
        match self.sessions.remove(id) {
            Some((_, session)) => {
                session.close();
                debug!(session_id = %id, created_at = %session.created_at(), "Removed session");
                true
            }
            None => false,
        }
    }

    /// Remove `session` only if it is still the entry registered under its ID.
    pub(crate) fn delete_if_current(&self, session: &Arc<Session>) -> bool {
        let removed = self
            .sessions
            .remove_if(session.id(), |_, current| Arc::ptr_eq(current, session));
        if removed.is_some() {
            session.close();
            debug!(session_id = %session.id(), "Removed finished session");
        }
        removed.is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
