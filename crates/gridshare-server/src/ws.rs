use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use axum::extract::{ConnectInfo, FromRequest, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures::stream::{SplitSink, SplitStream};
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;

use gridshare_core::identity::{SessionId, is_valid_session_id};
use gridshare_core::net::messages::{Envelope, MessageType};
use gridshare_core::net::protocol::{decode_envelope, encode_envelope};

use crate::error::AppError;
use crate::room::Room;
use crate::session::Session;
use crate::state::{AppState, SharedRoom};

/// Reason sent to clients turned away at capacity.
pub const ROOM_FULL: &str = "Room is full";

type WsSender = SplitSink<WebSocket, Message>;
type WsReceiver = SplitStream<WebSocket>;

/// GET /ws: admit a client into the room.
///
/// Capacity is checked before the upgrade so a doomed connection costs no
/// handshake. The check can race with other admissions; `Room::add_session`
/// makes the final call after the upgrade.
pub async fn ws_handler(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> Result<Response, AppError> {
    if state.room.is_full() {
        tracing::warn!(
            capacity = state.room.capacity(),
            "Room is full, rejecting connection"
        );
        return Err(AppError::ServiceUnavailable(ROOM_FULL.to_string()));
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);

    // Perform WebSocket upgrade manually
    let ws = WebSocketUpgrade::from_request(request, &state)
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state, peer))
        .into_response())
}

async fn handle_socket(socket: WebSocket, state: AppState, peer: Option<SocketAddr>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, rx) = mpsc::channel::<Utf8Bytes>(state.config.limits.session_message_buffer);
    let session = Arc::new(Session::new(state.ids.next_id(), tx));
    debug_assert!(is_valid_session_id(session.id()));

    if !admit(&state.room, &session, &mut ws_sender).await {
        tracing::debug!(session_id = session.id(), ?peer, "Rejected connection closed");
        return;
    }

    // Not announced yet, so a failed handshake leaves without a playerLeft.
    if let Err(e) = sync_new_session(&mut ws_sender, &state.room, &session).await {
        tracing::warn!(session_id = session.id(), error = %e, "Failed to send welcome");
        state.room.remove_session(session.id());
        return;
    }

    tracing::info!(session_id = session.id(), ?peer, "Session connected");

    spawn_writer(ws_sender, rx);
    let departure = Departure {
        room: Arc::clone(&state.room),
        session_id: session.id().to_string(),
    };

    state.room.broadcast_joined(&session);

    read_loop(
        &mut ws_receiver,
        &state.room,
        &session,
        state.config.limits.idle_timeout(),
    )
    .await;

    drop(departure);
    tracing::info!(session_id = session.id(), ?peer, "Session disconnected");
}

/// Removes the session from the room and announces its departure when the
/// connection task is done with it, however the read loop ended.
struct Departure {
    room: SharedRoom,
    session_id: SessionId,
}

impl Drop for Departure {
    fn drop(&mut self) {
        self.room.leave(&self.session_id);
    }
}

/// Register the session in the room. When the room filled up after the
/// pre-upgrade check, tell the client why and close the sink instead.
async fn admit<S>(room: &Room, session: &Arc<Session>, sink: &mut S) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: Into<axum::BoxError>,
{
    let Err(e) = room.add_session(Arc::clone(session)) else {
        return true;
    };

    tracing::warn!(session_id = session.id(), error = %e, "Admission failed");
    if let Err(e) = send_envelope(sink, &Envelope::error(ROOM_FULL)).await {
        tracing::debug!(error = %e, "Failed to send room full error");
    }
    if let Err(e) = sink.close().await {
        tracing::debug!(error = %axum::Error::new(e), "Failed to close rejected connection");
    }
    false
}

/// Bring a newly admitted session up to date: its own welcome first, then one
/// `playerJoined` for every other session already in the room.
async fn sync_new_session(
    ws_sender: &mut WsSender,
    room: &Room,
    session: &Session,
) -> Result<(), axum::Error> {
    send_envelope(
        ws_sender,
        &Envelope::welcome(session.id(), session.position()),
    )
    .await?;

    for other in room.list_sessions() {
        if other.id() != session.id() {
            send_envelope(
                ws_sender,
                &Envelope::player_joined(other.id(), other.position()),
            )
            .await?;
        }
    }
    Ok(())
}

async fn send_envelope<S>(sink: &mut S, msg: &Envelope) -> Result<(), axum::Error>
where
    S: Sink<Message> + Unpin,
    S::Error: Into<axum::BoxError>,
{
    let text = encode_envelope(msg).map_err(axum::Error::new)?;
    sink.send(Message::Text(text.into()))
        .await
        .map_err(axum::Error::new)
}

/// Drain the session's outbound queue into the socket. Ends, closing the
/// socket, once every sender handle is gone or a write fails.
fn spawn_writer(mut ws_sender: WsSender, mut rx: mpsc::Receiver<Utf8Bytes>) {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        if let Err(e) = ws_sender.close().await {
            tracing::trace!(error = %e, "Socket already closed");
        }
    });
}

/// Process inbound frames in arrival order until the connection ends.
async fn read_loop(
    ws_receiver: &mut WsReceiver,
    room: &Room,
    session: &Session,
    idle_timeout: Option<Duration>,
) {
    loop {
        let next = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, ws_receiver.next()).await {
                Ok(next) => next,
                Err(_) => {
                    tracing::info!(session_id = session.id(), ?limit, "Closing idle connection");
                    break;
                },
            },
            None => ws_receiver.next().await,
        };

        let decoded = match next {
            Some(Ok(Message::Text(text))) => decode_envelope(text.as_str().as_bytes()),
            Some(Ok(Message::Binary(data))) => decode_envelope(&data),
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::debug!(session_id = session.id(), error = %e, "WebSocket error");
                break;
            },
        };

        let msg = match decoded {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(session_id = session.id(), error = %e, "Undecodable message");
                break;
            },
        };

        match msg.kind {
            MessageType::PositionUpdate => {
                let position = msg.position.unwrap_or_default();
                session.set_position(position.x, position.y);
                room.broadcast_position(session.id(), position);
                tracing::debug!(
                    session_id = session.id(),
                    x = position.x,
                    y = position.y,
                    "Session moved"
                );
            },
            other => {
                tracing::trace!(session_id = session.id(), kind = ?other, "Ignoring message");
            },
        }
    }
}
