//! Per-connection auth session.
//!
//! A [`Session`] is created alongside its connection in the
//! [`Pending`](SessionStatus::Pending) state. Downstream command handling
//! activates it once the client authenticates; the connection expires it on
//! stop. Expiry is terminal.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::ids::SessionId;

/// Lifecycle state of a [`Session`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Anonymous; no user bound yet.
    Pending,
    /// Authenticated as a user.
    Active,
    /// The connection stopped. Terminal.
    Expired,
}

struct SessionState {
    status: SessionStatus,
    user: Option<String>,
    last_accessed_at: DateTime<Utc>,
}

/// Auth context owned by one connection.
///
/// Interior state is behind a mutex so the session can be shared (via `Arc`)
/// with concurrent downstream handlers.
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
}

impl Session {
    /// Create an anonymous, pending session.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            created_at: now,
            state: Mutex::new(SessionState {
                status: SessionStatus::Pending,
                user: None,
                last_accessed_at: now,
            }),
        }
    }

    /// Session ID.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// When the session was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the session was last activated or touched.
    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        self.state.lock().last_accessed_at
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        self.state.lock().status
    }

    /// Bound user, if authenticated.
    pub fn user(&self) -> Option<String> {
        self.state.lock().user.clone()
    }

    /// Bind a user and mark the session active.
    ///
    /// Returns `false` (and changes nothing) if the session already expired.
    pub fn activate(&self, user: impl Into<String>) -> bool {
        let mut state = self.state.lock();
        if state.status == SessionStatus::Expired {
            return false;
        }
        state.status = SessionStatus::Active;
        state.user = Some(user.into());
        state.last_accessed_at = Utc::now();
        true
    }

    /// Record activity on the session.
    pub fn touch(&self) {
        let mut state = self.state.lock();
        if state.status != SessionStatus::Expired {
            state.last_accessed_at = Utc::now();
        }
    }

    /// Mark the session expired. Idempotent.
    pub fn expire(&self) {
        self.state.lock().status = SessionStatus::Expired;
    }

    /// Whether a user is bound and the session has not expired.
    pub fn is_active(&self) -> bool {
        self.status() == SessionStatus::Active
    }

    /// Whether the session has expired.
    pub fn is_expired(&self) -> bool {
        self.status() == SessionStatus::Expired
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("status", &state.status)
            .field("user", &state.user)
            .finish_non_exhaustive()
    }
}
