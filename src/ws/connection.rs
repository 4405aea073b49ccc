use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_with_config};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::error::WsError;
use crate::Result;
use crate::transport::{Connection, Connector, EventSink, Payload, Target, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Characters that may not appear in a subprotocol token (RFC 7230 separators).
const SEPARATORS: &[u8] = b"()<>@,;:\\\"/[]?={}";

/// Lifecycle of a [`WebSocket`] handle.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Opening handshake in progress
    Connecting,
    /// Messages and PINGs can be sent
    Open,
    /// Close requested, waiting for the peer
    Closing,
    /// Gone for good
    Closed,
}

impl ReadyState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Open => 1,
            Self::Closing => 2,
            Self::Closed => 3,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// [`ReadyState`] shared between a handle and the task driving its socket.
#[derive(Debug)]
struct SharedState(AtomicU8);

impl SharedState {
    fn new(state: ReadyState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    fn get(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: ReadyState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }

    fn transition(&self, from: ReadyState, to: ReadyState) -> bool {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Creates [`WebSocket`] handles backed by `tokio-tungstenite`.
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    /// Protocol limits passed to tungstenite. `None` uses tungstenite's defaults.
    pub websocket_config: Option<WebSocketConfig>,
}

impl WebSocketConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_websocket_config(websocket_config: WebSocketConfig) -> Self {
        Self {
            websocket_config: Some(websocket_config),
        }
    }
}

impl Connector for WebSocketConnector {
    type Connection = WebSocket;

    fn connect(&self, target: &Target, events: EventSink) -> Result<WebSocket> {
        let request = build_request(target)?;
        let runtime = Handle::try_current().map_err(|_e| WsError::NoRuntime)?;

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let state = Arc::new(SharedState::new(ReadyState::Connecting));
        let token = CancellationToken::new();

        let session = Session {
            websocket_config: self.websocket_config,
            handshake_timeout: target.options.handshake_timeout,
            close_timeout: target.options.close_timeout,
            outgoing_rx,
            events,
            state: Arc::clone(&state),
            token: token.clone(),
        };
        runtime.spawn(session.run(request));

        Ok(WebSocket {
            outgoing_tx,
            state,
            token,
        })
    }
}

/// Build the opening handshake request for `target`.
fn build_request(target: &Target) -> Result<Request> {
    let url = Url::parse(&target.address)?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(WsError::UnsupportedScheme(url.scheme().to_owned()).into());
    }

    let mut request = url.as_str().into_client_request()?;

    if !target.protocols.is_empty() {
        let mut seen = HashSet::new();
        for protocol in &target.protocols {
            let is_token = !protocol.is_empty()
                && protocol
                    .bytes()
                    .all(|b| b.is_ascii_graphic() && !SEPARATORS.contains(&b));
            if !is_token || !seen.insert(protocol.as_str()) {
                return Err(WsError::InvalidProtocol(protocol.clone()).into());
            }
        }

        let value = HeaderValue::from_str(&target.protocols.join(", "))
            .map_err(|_e| WsError::InvalidProtocol(target.protocols.join(", ")))?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
    }

    for (name, value) in &target.options.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_e| WsError::InvalidHeader(name.clone()))?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_e| WsError::InvalidHeader(name.clone()))?;
        request.headers_mut().append(header_name, header_value);
    }

    Ok(request)
}

/// Handle to a WebSocket driven by a background task.
///
/// Sending never blocks: frames are queued for the task, and fail immediately unless the
/// handle is [`ReadyState::Open`]. Closing cancels the task's token, which interrupts the
/// handshake or any write still waiting on the socket.
#[derive(Debug)]
pub struct WebSocket {
    outgoing_tx: mpsc::UnboundedSender<Message>,
    state: Arc<SharedState>,
    token: CancellationToken,
}

impl WebSocket {
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    fn enqueue(&self, message: Message) -> Result<()> {
        match self.state.get() {
            ReadyState::Open => {
                self.outgoing_tx
                    .send(message)
                    .map_err(|_e| WsError::NotOpen(ReadyState::Closed))?;
                Ok(())
            }
            state => Err(WsError::NotOpen(state).into()),
        }
    }
}

impl Connection for WebSocket {
    fn send(&self, payload: Payload) -> Result<()> {
        let message = match payload {
            Payload::Text(text) => Message::text(text),
            Payload::Binary(bytes) => Message::binary(bytes),
        };
        self.enqueue(message)
    }

    fn ping(&self, payload: &[u8]) -> Result<()> {
        self.enqueue(Message::Ping(payload.to_vec().into()))
    }

    fn close(&self) -> Result<()> {
        loop {
            let current = self.state.get();
            match current {
                ReadyState::Connecting | ReadyState::Open => {
                    if self.state.transition(current, ReadyState::Closing) {
                        self.token.cancel();
                        return Ok(());
                    }
                }
                ReadyState::Closing | ReadyState::Closed => return Ok(()),
            }
        }
    }
}

/// Background half of a [`WebSocket`]: runs the handshake, then pumps frames both ways.
struct Session {
    websocket_config: Option<WebSocketConfig>,
    handshake_timeout: Option<Duration>,
    close_timeout: Duration,
    outgoing_rx: mpsc::UnboundedReceiver<Message>,
    events: EventSink,
    state: Arc<SharedState>,
    token: CancellationToken,
}

impl Session {
    async fn run(mut self, request: Request) {
        match self.handshake(request).await {
            Ok(stream) => {
                if self.state.transition(ReadyState::Connecting, ReadyState::Open) {
                    self.events.emit(TransportEvent::Open);
                    self.pump(stream).await;
                } else {
                    // Closed while the handshake was completing
                    let (mut write, mut read) = stream.split();
                    self.close_gracefully(&mut write, &mut read).await;
                }
            }
            // Close was requested locally, there is nothing to report
            Err(WsError::ClosedBeforeOpen) => {}
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %e, "WebSocket handshake failed");

                self.events.emit(TransportEvent::Error(e.into()));
            }
        }

        self.state.set(ReadyState::Closed);
        self.events.emit(TransportEvent::Close);
    }

    async fn handshake(&self, request: Request) -> std::result::Result<WsStream, WsError> {
        let connect = async {
            let attempt = connect_async_with_config(request, self.websocket_config, false);
            let (stream, _response) = match self.handshake_timeout {
                Some(limit) => timeout(limit, attempt)
                    .await
                    .map_err(|_e| WsError::HandshakeTimeout(limit))?,
                None => attempt.await,
            }
            .map_err(WsError::Connection)?;
            Ok::<_, WsError>(stream)
        };

        tokio::select! {
            () = self.token.cancelled() => Err(WsError::ClosedBeforeOpen),
            result = connect => result,
        }
    }

    async fn pump(&mut self, stream: WsStream) {
        let (mut write, mut read) = stream.split();

        loop {
            tokio::select! {
                () = self.token.cancelled() => {
                    self.close_gracefully(&mut write, &mut read).await;
                    break;
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        self.events.emit(TransportEvent::Message(Payload::Text(text.as_str().to_owned())));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        self.events.emit(TransportEvent::Message(Payload::Binary(data.to_vec())));
                    }
                    Some(Ok(Message::Pong(data))) => {
                        self.events.emit(TransportEvent::Pong(data.to_vec()));
                    }
                    Some(Ok(Message::Close(_))) => {
                        self.state.set(ReadyState::Closing);
                        self.acknowledge_close(&mut write, &mut read).await;
                        break;
                    }
                    None => {
                        self.state.set(ReadyState::Closing);
                        break;
                    }
                    Some(Ok(Message::Ping(_) | Message::Frame(_))) => {
                        // PONG replies are queued by tungstenite and flushed on the next read
                    }
                    Some(Err(e)) => {
                        self.events.emit(TransportEvent::Error(WsError::Connection(e).into()));
                        break;
                    }
                },
                Some(message) = self.outgoing_rx.recv() => {
                    // A peer that stops reading can park this write forever
                    tokio::select! {
                        () = self.token.cancelled() => {
                            self.close_gracefully(&mut write, &mut read).await;
                            break;
                        }
                        result = write.send(message) => {
                            if let Err(e) = result {
                                self.events.emit(TransportEvent::Error(WsError::Connection(e).into()));
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Flush tungstenite's reply to the peer's close frame, then wait for the peer to hang up.
    async fn acknowledge_close(&self, write: &mut WsSink, read: &mut WsSource) {
        let handshake = async {
            if write.flush().await.is_err() {
                return;
            }
            while let Some(Ok(_)) = read.next().await {}
        };

        if timeout(self.close_timeout, handshake).await.is_err() {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                "Peer did not hang up within {:?} after closing, dropping connection",
                self.close_timeout
            );
        }
    }

    /// Send a close frame and wait for the peer's, bounded by the close timeout.
    async fn close_gracefully(&self, write: &mut WsSink, read: &mut WsSource) {
        let handshake = async {
            if write.send(Message::Close(None)).await.is_err() {
                return;
            }
            while let Some(Ok(frame)) = read.next().await {
                if frame.is_close() {
                    break;
                }
            }
        };

        if timeout(self.close_timeout, handshake).await.is_err() {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                "Peer did not acknowledge close within {:?}, dropping connection",
                self.close_timeout
            );
        }
    }
}
