use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc::error::TrySendError;

use gridshare_core::identity::SessionId;
use gridshare_core::net::messages::{Envelope, MessageType};
use gridshare_core::net::protocol::encode_envelope;
use gridshare_core::position::Position;

use crate::session::Session;

/// Default number of sessions the room admits.
pub const MAX_SESSIONS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    RoomFull { capacity: usize },
    NotFound(SessionId),
}

impl std::fmt::Display for RoomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoomFull { capacity } => write!(f, "room is full ({capacity} sessions)"),
            Self::NotFound(id) => write!(f, "session not found: {id}"),
        }
    }
}

impl std::error::Error for RoomError {}

/// The shared world: every active session, bounded by `capacity`.
///
/// Structural changes (add/remove) take the write lock. Lookups, listings and
/// broadcasts take the read lock. Session positions have their own locks, so
/// a broadcast in progress never blocks a move on another session.
pub struct Room {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    capacity: usize,
}

impl Default for Room {
    fn default() -> Self {
        Self::new(MAX_SESSIONS)
    }
}

impl Room {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Admit a session. The capacity check and the insert happen under one
    /// write lock, so concurrent admissions can never overfill the room.
    pub fn add_session(&self, session: Arc<Session>) -> Result<(), RoomError> {
        let mut sessions = self.write();
        if sessions.len() >= self.capacity {
            return Err(RoomError::RoomFull {
                capacity: self.capacity,
            });
        }
        let id = session.id().to_string();
        sessions.insert(id.clone(), session);
        tracing::info!(
            session_id = %id,
            count = sessions.len(),
            capacity = self.capacity,
            "Session joined"
        );
        Ok(())
    }

    /// Remove a session. Returns false (and does nothing) if it was absent.
    pub fn remove_session(&self, id: &str) -> bool {
        let mut sessions = self.write();
        let removed = sessions.remove(id).is_some();
        if removed {
            tracing::info!(
                session_id = id,
                count = sessions.len(),
                capacity = self.capacity,
                "Session left"
            );
        }
        removed
    }

    pub fn get_session(&self, id: &str) -> Result<Arc<Session>, RoomError> {
        self.read()
            .get(id)
            .map(Arc::clone)
            .ok_or_else(|| RoomError::NotFound(id.to_string()))
    }

    /// Point-in-time copy of the registered sessions, safe to iterate
    /// without holding the registry lock.
    pub fn list_sessions(&self) -> Vec<Arc<Session>> {
        self.read().values().map(Arc::clone).collect()
    }

    pub fn count(&self) -> usize {
        self.read().len()
    }

    pub fn is_full(&self) -> bool {
        self.count() >= self.capacity
    }

    /// Tear down a departed session: remove it and, if it was still
    /// registered, tell everyone else. Safe to call more than once.
    pub fn leave(&self, id: &str) -> bool {
        let removed = self.remove_session(id);
        if removed {
            self.broadcast_left(id);
        }
        removed
    }

    /// Announce a newly admitted session to every registered session.
    pub fn broadcast_joined(&self, session: &Session) {
        self.broadcast(&Envelope::player_joined(session.id(), session.position()));
    }

    pub fn broadcast_left(&self, id: &str) {
        self.broadcast(&Envelope::player_left(id));
    }

    pub fn broadcast_position(&self, id: &str, position: Position) {
        self.broadcast(&Envelope::position_update(id, position));
    }

    /// Best-effort fan-out. The message is encoded once; a closed or full
    /// queue is logged and skipped without affecting the other sessions.
    ///
    /// Any message type can be lost this way. A session whose queue is full
    /// misses `playerJoined`/`playerLeft` too, and its view of the roster stays
    /// wrong until it reconnects, so those drops are logged at warn.
    fn broadcast(&self, msg: &Envelope) {
        let frame = match encode_envelope(msg) {
            Ok(text) => Utf8Bytes::from(text),
            Err(e) => {
                tracing::warn!(kind = ?msg.kind, error = %e, "Failed to encode broadcast");
                return;
            },
        };

        let sessions = self.read();
        for (id, session) in sessions.iter() {
            let Err(e) = session.send(frame.clone()) else {
                continue;
            };
            match (&e, msg.kind) {
                (
                    TrySendError::Full(_),
                    MessageType::PlayerJoined | MessageType::PlayerLeft,
                ) => {
                    tracing::warn!(
                        session_id = %id, kind = ?msg.kind,
                        "Session queue full, roster change dropped"
                    );
                },
                _ => {
                    tracing::debug!(
                        session_id = %id, kind = ?msg.kind, error = %e,
                        "Skipping broadcast to slow or disconnected session"
                    );
                },
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}
