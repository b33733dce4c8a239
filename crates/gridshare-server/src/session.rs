use std::sync::{Mutex, PoisonError};

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use gridshare_core::identity::SessionId;
use gridshare_core::position::Position;

/// Per-session sender for outbound WebSocket text frames.
/// Bounded so a slow client cannot grow server memory without limit.
/// `Utf8Bytes` clones are cheap, so one encoded broadcast is shared by all.
pub type SessionSender = mpsc::Sender<Utf8Bytes>;

/// Server-side state for one connected participant.
///
/// The position has its own lock, separate from the room registry, so moving
/// one session never waits on another.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    position: Mutex<Position>,
    sender: SessionSender,
}

impl Session {
    /// New session at the origin.
    pub fn new(id: SessionId, sender: SessionSender) -> Self {
        Self {
            id,
            position: Mutex::new(Position::ORIGIN),
            sender,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Consistent snapshot of the current position.
    pub fn position(&self) -> Position {
        *self.position.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_position(&self, x: f64, y: f64) {
        let mut position = self.position.lock().unwrap_or_else(PoisonError::into_inner);
        *position = Position::new(x, y);
    }

    /// Queue a frame for this session's writer without waiting.
    pub fn send(&self, frame: Utf8Bytes) -> Result<(), TrySendError<Utf8Bytes>> {
        self.sender.try_send(frame)
    }
}
