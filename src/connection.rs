//! Activity feed connection with fixed-delay reconnect.
//!
//! [`ConnectionManager`] owns at most one socket at a time. Each session
//! connects, subscribes to [`ACTIVITIES_TOPIC`], and feeds text frames to the
//! [`ActivityEngine`] until the socket closes. Every closure, whatever its
//! cause, is followed by exactly one reconnect after the configured delay.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::ACTIVITIES_TOPIC;
use crate::engine::{ActivityEngine, FrameOutcome};
use crate::protocol::Request;
use crate::reporter;
use crate::types::ExitSummary;

/// A frame read from the socket, reduced to what the manager acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketFrame {
    Text(String),
    Close { code: Option<u16>, reason: String },
    /// Binary, ping, pong: handled by the transport or irrelevant.
    Other,
}

/// One open connection to the feed.
pub trait ActivitySocket {
    fn send_text(&mut self, text: String) -> impl Future<Output = Result<()>>;

    /// Next frame, or `None` once the stream has ended.
    fn next_frame(&mut self) -> impl Future<Output = Option<Result<SocketFrame>>>;

    fn close(&mut self) -> impl Future<Output = Result<()>>;
}

/// Opens sockets for the manager.
pub trait Connector {
    type Socket: ActivitySocket;

    fn connect(&mut self) -> impl Future<Output = Result<Self::Socket>>;
}

// ── tungstenite transport ────────────────────────────────────────────

/// Connects to the feed endpoint over WebSocket (TLS via native-tls).
pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("invalid feed URL {url}"))?;
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Connector for WsConnector {
    type Socket = WsSocket;

    async fn connect(&mut self) -> Result<WsSocket> {
        let (stream, response) = connect_async(self.url.as_str())
            .await
            .with_context(|| format!("failed to connect to {}", self.url))?;
        debug!("Handshake response status: {}", response.status());
        Ok(WsSocket { stream })
    }
}

pub struct WsSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl ActivitySocket for WsSocket {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .context("failed to send frame")
    }

    async fn next_frame(&mut self) -> Option<Result<SocketFrame>> {
        let message = self.stream.next().await?;
        Some(message.map_err(anyhow::Error::from).map(|msg| match msg {
            Message::Text(text) => SocketFrame::Text(text.as_str().to_owned()),
            Message::Close(frame) => SocketFrame::Close {
                code: frame.as_ref().map(|f| u16::from(f.code)),
                reason: frame
                    .map(|f| f.reason.as_str().to_owned())
                    .unwrap_or_default(),
            },
            // tungstenite answers pings itself
            _ => SocketFrame::Other,
        }))
    }

    async fn close(&mut self) -> Result<()> {
        self.stream
            .close(None)
            .await
            .context("failed to close socket")
    }
}

// ── ConnectionManager ────────────────────────────────────────────────

/// Lifecycle of the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(label)
    }
}

enum SessionEnd {
    Closed,
    Shutdown,
}

pub struct ConnectionManager<C: Connector> {
    connector: C,
    engine: ActivityEngine,
    token: String,
    reconnect_delay: Duration,
    state: SessionState,
    sessions_opened: u64,
    /// Nonce of the subscribe request sent on the current session.
    nonce: Option<Uuid>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, engine: ActivityEngine, token: &str, reconnect_delay: Duration) -> Self {
        Self {
            connector,
            engine,
            token: token.to_string(),
            reconnect_delay,
            state: SessionState::Idle,
            sessions_opened: 0,
            nonce: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened
    }

    /// Nonce of the subscribe request sent on the open session, if any.
    pub fn subscription_nonce(&self) -> Option<Uuid> {
        self.nonce
    }

    pub fn engine(&self) -> &ActivityEngine {
        &self.engine
    }

    pub fn exit_summary(&self) -> ExitSummary {
        self.engine.exit_summary(self.sessions_opened)
    }

    /// Keep a session alive until `shutdown` resolves; pass
    /// `std::future::pending()` to run for the life of the process.
    ///
    /// On shutdown an open session is unsubscribed and closed.
    pub async fn run_until<F: Future<Output = ()>>(&mut self, shutdown: F) {
        tokio::pin!(shutdown);
        loop {
            if let SessionEnd::Shutdown = self.run_session(shutdown.as_mut()).await {
                break;
            }
            self.state = SessionState::Closed;
            self.nonce = None;

            info!(
                "Reconnecting in {:.1} seconds…",
                self.reconnect_delay.as_secs_f64()
            );
            let resumed = tokio::select! {
                biased;
                _ = shutdown.as_mut() => false,
                _ = tokio::time::sleep(self.reconnect_delay) => true,
            };
            if !resumed {
                break;
            }
        }
        self.state = SessionState::Closed;
        self.nonce = None;
        info!("Connection manager stopped after {} session(s)", self.sessions_opened);
    }

    async fn run_session<F: Future<Output = ()>>(&mut self, mut shutdown: Pin<&mut F>) -> SessionEnd {
        self.state = SessionState::Connecting;
        info!("→ Attempting to connect to the activity feed…");

        let connected = tokio::select! {
            biased;
            _ = shutdown.as_mut() => None,
            result = self.connector.connect() => Some(result),
        };
        let mut socket = match connected {
            None => return SessionEnd::Shutdown,
            Some(Ok(socket)) => socket,
            Some(Err(e)) => {
                error!("WebSocket error: {e:#}");
                return SessionEnd::Closed;
            }
        };

        self.state = SessionState::Open;
        self.sessions_opened += 1;
        info!("Connected to the activity feed (session {})", self.sessions_opened);
        self.subscribe(&mut socket).await;

        loop {
            let frame = tokio::select! {
                biased;
                _ = shutdown.as_mut() => None,
                frame = socket.next_frame() => Some(frame),
            };
            let Some(frame) = frame else {
                self.unsubscribe(&mut socket).await;
                return SessionEnd::Shutdown;
            };

            match frame {
                Some(Ok(SocketFrame::Text(text))) => {
                    if let FrameOutcome::Activity {
                        update: Some(update),
                        ..
                    } = self.engine.handle_text(&text)
                    {
                        reporter::report_update(&update);
                    }
                }
                Some(Ok(SocketFrame::Other)) => {}
                Some(Ok(SocketFrame::Close { code, reason })) => {
                    let reason = if reason.is_empty() { "<no reason>" } else { reason.as_str() };
                    warn!("Connection closed: {code:?} {reason}");
                    if let Err(e) = socket.close().await {
                        warn!("Failed to finish closing handshake: {e:#}");
                    }
                    return SessionEnd::Closed;
                }
                // A read error ends the stream; it is reported here and the
                // session then closes like any other.
                Some(Err(e)) => {
                    error!("WebSocket error: {e:#}");
                    warn!("Connection closed after transport error");
                    return SessionEnd::Closed;
                }
                None => {
                    warn!("Connection closed: stream ended");
                    return SessionEnd::Closed;
                }
            }
        }
    }

    async fn subscribe(&mut self, socket: &mut C::Socket) {
        let request = Request::subscribe(ACTIVITIES_TOPIC, &self.token);
        self.nonce = Some(request.nonce);
        match send_request(socket, &request).await {
            Ok(()) => info!("Subscribed to {ACTIVITIES_TOPIC} (nonce {})", request.nonce),
            Err(e) => error!("WebSocket error: {e:#}"),
        }
    }

    async fn unsubscribe(&mut self, socket: &mut C::Socket) {
        let request = Request::unsubscribe(ACTIVITIES_TOPIC, &self.token);
        match send_request(socket, &request).await {
            Ok(()) => info!("Unsubscribed from {ACTIVITIES_TOPIC} (nonce {})", request.nonce),
            Err(e) => warn!("Failed to unsubscribe: {e:#}"),
        }
        if let Err(e) = socket.close().await {
            warn!("Failed to close socket: {e:#}");
        }
    }
}

async fn send_request<S: ActivitySocket>(socket: &mut S, request: &Request) -> Result<()> {
    let text = request.to_text()?;
    socket.send_text(text).await
}
