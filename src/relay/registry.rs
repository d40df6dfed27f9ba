//! Live session tracking.
//!
//! # Responsibilities
//! - Assign a unique id to every relay session
//! - Track each session's state (Dialing → Forwarding → Draining → Closed)
//! - Bound the number of concurrent sessions
//! - Remove the entry when the session's guard is dropped

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

/// Unique identifier for a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Downstream accepted, upstream being dialed.
    Dialing,
    /// Both directions running.
    Forwarding,
    /// A termination trigger fired; connections are being closed.
    Draining,
    /// Both connections closed.
    Closed,
}

#[derive(Debug, Clone)]
struct SessionEntry {
    state: SessionState,
    target: String,
    started: Instant,
}

/// Point-in-time view of one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub state: SessionState,
    pub target: String,
    pub age_secs: f64,
}

/// Registry of live sessions, shared by every relay invocation.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<SessionId, SessionEntry>>,
    limit: Arc<Semaphore>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            limit: Arc::new(Semaphore::new(max_sessions)),
            max_sessions,
        }
    }

    /// Reserve a session slot without waiting. `None` when the limit is hit.
    pub fn try_reserve(&self) -> Option<SessionSlot> {
        let permit = Arc::clone(&self.limit).try_acquire_owned().ok()?;
        Some(SessionSlot { _permit: permit })
    }

    /// Register a new session in the `Dialing` state.
    pub fn register(&self, slot: SessionSlot, target: &str) -> SessionGuard {
        let id = SessionId::new();
        self.sessions.insert(
            id,
            SessionEntry {
                state: SessionState::Dialing,
                target: target.to_string(),
                started: Instant::now(),
            },
        );
        metrics::gauge!("gateway_relay_sessions_active").increment(1.0);
        SessionGuard {
            id,
            sessions: Arc::clone(&self.sessions),
            _slot: slot,
        }
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn state(&self, id: SessionId) -> Option<SessionState> {
        self.sessions.get(&id).map(|entry| entry.state)
    }

    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        let mut sessions: Vec<SessionSnapshot> = self
            .sessions
            .iter()
            .map(|entry| SessionSnapshot {
                id: *entry.key(),
                state: entry.state,
                target: entry.target.clone(),
                age_secs: entry.started.elapsed().as_secs_f64(),
            })
            .collect();
        sessions.sort_by(|a, b| b.age_secs.total_cmp(&a.age_secs));
        sessions
    }

    /// Wait until every session has ended or `timeout` elapses.
    /// Returns the number of sessions still alive.
    pub async fn drain(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        while !self.sessions.is_empty() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(10_000)
    }
}

/// A reserved session slot. Released when dropped.
#[derive(Debug)]
pub struct SessionSlot {
    _permit: OwnedSemaphorePermit,
}

/// Keeps a session registered. Dropping it removes the entry and frees the slot.
#[derive(Debug)]
pub struct SessionGuard {
    id: SessionId,
    sessions: Arc<DashMap<SessionId, SessionEntry>>,
    _slot: SessionSlot,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn set_state(&self, state: SessionState) {
        if let Some(mut entry) = self.sessions.get_mut(&self.id) {
            tracing::trace!(session_id = %self.id, from = ?entry.state, to = ?state, "Session state");
            entry.state = state;
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.remove(&self.id);
        metrics::gauge!("gateway_relay_sessions_active").decrement(1.0);
    }
}
