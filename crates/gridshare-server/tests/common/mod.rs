use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use gridshare_core::net::messages::{Envelope, MessageType};
use gridshare_core::net::protocol::{decode_envelope, encode_envelope};
use gridshare_core::position::Position;

use gridshare_server::build_app;
use gridshare_server::config::ServerConfig;
use gridshare_server::state::AppState;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a test server with the default config.
    pub async fn new() -> Self {
        Self::with_config(ServerConfig::default()).await
    }

    /// Start a test server that admits at most `max_sessions` clients.
    pub async fn with_capacity(max_sessions: usize) -> Self {
        let mut config = ServerConfig::default();
        config.limits.max_sessions = max_sessions;
        Self::with_config(config).await
    }

    pub async fn with_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, state) = build_app(config);

        let handle = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            state,
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Wait until the room holds exactly `expected` sessions.
    pub async fn wait_for_count(&self, expected: usize) {
        let deadline = tokio::time::Instant::now() + READ_TIMEOUT;
        while self.state.room.count() != expected {
            assert!(
                tokio::time::Instant::now() < deadline,
                "room count stuck at {}, expected {expected}",
                self.state.room.count()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Connect a WebSocket client to the given URL.
pub async fn ws_connect(url: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

/// A client that has completed the join handshake.
pub struct Joined {
    pub stream: WsStream,
    pub id: String,
    /// `playerJoined` messages received for sessions that were already present.
    pub others: Vec<Envelope>,
}

/// Connect, read the welcome and the snapshot, and stop after the client's
/// own `playerJoined` echo.
pub async fn ws_join(url: &str) -> Joined {
    let mut stream = ws_connect(url).await;

    let welcome = ws_read_envelope(&mut stream).await;
    assert_eq!(welcome.kind, MessageType::Welcome, "first frame: {welcome:?}");
    assert_eq!(welcome.position, Some(Position::ORIGIN));
    let id = welcome.player_id.unwrap();

    let mut others = Vec::new();
    loop {
        let msg = ws_read_envelope(&mut stream).await;
        assert_eq!(msg.kind, MessageType::PlayerJoined, "unexpected: {msg:?}");
        if msg.player_id.as_deref() == Some(id.as_str()) {
            break;
        }
        others.push(msg);
    }

    Joined { stream, id, others }
}

/// Read the next text frame and decode it, skipping control frames.
pub async fn ws_read_envelope(stream: &mut WsStream) -> Envelope {
    loop {
        let msg = tokio::time::timeout(READ_TIMEOUT, stream.next())
            .await
            .expect("Timed out waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");
        match msg {
            Message::Text(text) => return decode_envelope(text.as_str().as_bytes()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Expected text frame, got: {other:?}"),
        }
    }
}

/// Try to read a text frame within `wait`. Returns `None` on timeout.
pub async fn ws_try_read_envelope(stream: &mut WsStream, wait: Duration) -> Option<Envelope> {
    match tokio::time::timeout(wait, stream.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => Some(decode_envelope(text.as_str().as_bytes()).unwrap()),
        _ => None,
    }
}

/// Read until the server closes the connection.
pub async fn ws_expect_closed(stream: &mut WsStream) {
    loop {
        let next = tokio::time::timeout(READ_TIMEOUT, stream.next())
            .await
            .expect("Timed out waiting for close");
        match next {
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
            Some(Ok(_)) => continue,
        }
    }
}

pub async fn ws_send_envelope(stream: &mut WsStream, msg: &Envelope) {
    let text = encode_envelope(msg).unwrap();
    stream.send(Message::Text(text.into())).await.unwrap();
}

pub async fn ws_send_move(stream: &mut WsStream, x: f64, y: f64) {
    ws_send_envelope(stream, &Envelope::move_to(Position::new(x, y))).await;
}
