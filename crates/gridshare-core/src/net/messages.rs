use serde::{Deserialize, Serialize};

use crate::identity::SessionId;
use crate::position::Position;

/// Network message type discriminator, carried in the `type` field.
///
/// Anything the server does not recognise (or a missing `type`) decodes as
/// [`MessageType::Unknown`] so newer clients do not get disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    // Server -> new client
    Welcome,

    // Server -> clients
    PlayerJoined,
    PlayerLeft,
    Error,

    // Both directions
    PositionUpdate,

    #[default]
    #[serde(other)]
    Unknown,
}

/// The JSON envelope exchanged over the socket.
///
/// `player_id` is set on every server-sent message except `error`, where it
/// carries the human-readable reason instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type", default)]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Envelope {
    pub fn welcome(player_id: &str, position: Position) -> Self {
        Self::with_player(MessageType::Welcome, player_id, Some(position))
    }

    pub fn player_joined(player_id: &str, position: Position) -> Self {
        Self::with_player(MessageType::PlayerJoined, player_id, Some(position))
    }

    pub fn player_left(player_id: &str) -> Self {
        Self::with_player(MessageType::PlayerLeft, player_id, None)
    }

    /// Server-side broadcast of a session's new position.
    pub fn position_update(player_id: &str, position: Position) -> Self {
        Self::with_player(MessageType::PositionUpdate, player_id, Some(position))
    }

    /// Client-side request to move; the server fills in the sender's id.
    pub fn move_to(position: Position) -> Self {
        Self {
            kind: MessageType::PositionUpdate,
            player_id: None,
            position: Some(position),
        }
    }

    pub fn error(reason: &str) -> Self {
        Self::with_player(MessageType::Error, reason, None)
    }

    fn with_player(kind: MessageType, player_id: &str, position: Option<Position>) -> Self {
        Self {
            kind,
            player_id: Some(player_id.to_string()),
            position,
        }
    }
}
