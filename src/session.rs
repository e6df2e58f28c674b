//! Session manager: per-session UI state (current workspace, current
//! branch, in-progress palace view).
//!
//! Grounded on `auth/session.rs`'s `SessionManager` — a `DashMap` keyed by
//! session id, `create`/`get`/`revoke` verbs — with the HKDF key
//! derivation and TTL expiry dropped: a Smaragda session is a cursor over
//! already-authenticated kernel state, not a fresh authentication grant.
use crate::error::{SmaragdaError, SmaragdaResult};
use crate::ids::Id;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Mutable per-session state a client accumulates across calls: which
/// workspace and branch it's currently scoped to, and an opaque
/// client-side view cursor (the "palace" UI's current position).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    /// The workspace tag this session is currently scoped to, if any.
    pub current_workspace: Option<String>,
    /// The branch this session currently reads/writes against.
    pub current_branch: Option<Id>,
    /// Opaque client view state, round-tripped verbatim.
    pub palace_state: Option<serde_json::Value>,
}

/// Tracks [`SessionState`] per session id. Sessions are created lazily on
/// first touch and live for the life of the process — there is no
/// expiry, since the session holds only UI cursor state, not credentials.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: DashMap<String, SessionState>,
}

impl SessionManager {
    /// Construct an empty session manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a session's state, creating it with defaults if absent.
    pub fn get_or_create(&self, session_id: &str) -> SessionState {
        self.sessions.entry(session_id.to_string()).or_default().clone()
    }

    /// Fetch a session's state. Errors if the session was never touched.
    pub fn get(&self, session_id: &str) -> SmaragdaResult<SessionState> {
        self.sessions
            .get(session_id)
            .map(|s| s.clone())
            .ok_or_else(|| SmaragdaError::NotFound {
                kind: "session",
                id: session_id.to_string(),
            })
    }

    /// Set the current branch for a session.
    pub fn set_branch(&self, session_id: &str, branch_id: Id) {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .current_branch = Some(branch_id);
    }

    /// Set the current workspace for a session.
    pub fn set_workspace(&self, session_id: &str, workspace: impl Into<String>) {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .current_workspace = Some(workspace.into());
    }

    /// Set the opaque palace view state for a session.
    pub fn set_palace_state(&self, session_id: &str, state: serde_json::Value) {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .palace_state = Some(state);
    }

    /// Drop a session's state entirely.
    pub fn revoke(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    /// Number of tracked sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether any session is tracked.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
