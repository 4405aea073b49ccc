//! Boundary between the [`Supervisor`](crate::Supervisor) and the transport it drives.
//!
//! A [`Connector`] creates [`Connection`] handles. Each handle reports what happens to it by
//! pushing [`TransportEvent`]s into the [`EventSink`] it was created with.

use std::fmt::Debug;
use std::time::Duration;

use bon::Builder;
use tokio::sync::mpsc;

use crate::Result;
use crate::error::Error;

const DEFAULT_CLOSE_TIMEOUT_DURATION: Duration = Duration::from_secs(5);

/// Where and how to connect. Reused unchanged on every reconnection attempt.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Target {
    /// Address of the remote endpoint, e.g. `wss://example.com/stream`
    #[builder(into)]
    pub address: String,
    /// Subprotocols offered during the handshake
    #[builder(default)]
    pub protocols: Vec<String>,
    /// Transport-specific options
    #[builder(default)]
    pub options: TransportOptions,
}

impl Target {
    /// Target with no subprotocols and default options.
    pub fn new<S: Into<String>>(address: S) -> Self {
        Self::builder().address(address).build()
    }
}

/// Options passed verbatim to the transport on every attempt.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct TransportOptions {
    /// Extra headers sent with the opening handshake
    #[builder(default)]
    pub headers: Vec<(String, String)>,
    /// Upper bound on the opening handshake. `None` waits for as long as the transport does.
    pub handshake_timeout: Option<Duration>,
    /// How long a close waits for the peer to acknowledge before the connection is dropped
    #[builder(default = DEFAULT_CLOSE_TIMEOUT_DURATION)]
    pub close_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Application data carried by a message frame. Never inspected by the supervisor.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

/// Lifecycle events a transport reports for one connection handle.
#[non_exhaustive]
#[derive(Debug)]
pub enum TransportEvent {
    /// The connection is established
    Open,
    /// A text or binary message arrived
    Message(Payload),
    /// The transport failed. Fatal errors are followed by [`TransportEvent::Close`].
    Error(Error),
    /// The connection is gone. Reported at most once per handle.
    Close,
    /// A PONG frame arrived
    Pong(Vec<u8>),
}

/// Generation-tagged sender handed to a [`Connector`] for one connection handle.
///
/// Events pushed after the handle has been superseded are discarded by the supervisor.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
}

impl EventSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { generation, tx }
    }

    /// Generation of the handle this sink belongs to.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report an event. Returns `false` once the supervisor has shut down.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send((self.generation, event)).is_ok()
    }
}

/// Factory for transport connections.
pub trait Connector: Send + Sync + 'static {
    /// Handle type produced by [`Connector::connect`]
    type Connection: Connection;

    /// Start a connection to `target`.
    ///
    /// Must not block. An `Err` here is a construction failure: no handle exists and nothing
    /// will be reported on `events`. On success every later outcome, the handshake included,
    /// is reported on `events`.
    fn connect(&self, target: &Target, events: EventSink) -> Result<Self::Connection>;
}

/// A single transport connection. All methods are non-blocking and may fail synchronously.
pub trait Connection: Debug + Send + Sync + 'static {
    /// Queue an application message.
    fn send(&self, payload: Payload) -> Result<()>;

    /// Queue a PING control frame.
    fn ping(&self, payload: &[u8]) -> Result<()>;

    /// Request the connection be closed. [`TransportEvent::Close`] follows once it is.
    fn close(&self) -> Result<()>;
}
