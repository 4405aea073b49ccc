#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use super::connection::ReadyState;

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the WebSocket server
    Connection(tokio_tungstenite::tungstenite::Error),
    /// The operation needs an open connection
    NotOpen(ReadyState),
    /// The opening handshake did not finish in time
    HandshakeTimeout(Duration),
    /// The connection was closed before the opening handshake finished
    ClosedBeforeOpen,
    /// The address does not use the `ws` or `wss` scheme
    UnsupportedScheme(String),
    /// A subprotocol is empty, duplicated or not a valid token
    InvalidProtocol(String),
    /// A handshake header name or value is invalid
    InvalidHeader(String),
    /// No tokio runtime to drive the connection on
    NoRuntime,
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::NotOpen(state) => write!(f, "WebSocket is not open: readyState {state:?}"),
            Self::HandshakeTimeout(limit) => {
                write!(f, "WebSocket opening handshake timed out after {limit:?}")
            }
            Self::ClosedBeforeOpen => {
                write!(f, "WebSocket was closed before the connection was established")
            }
            Self::UnsupportedScheme(scheme) => {
                write!(f, "Unsupported WebSocket URL scheme: {scheme}")
            }
            Self::InvalidProtocol(protocol) => write!(f, "Invalid subprotocol: {protocol:?}"),
            Self::InvalidHeader(name) => write!(f, "Invalid handshake header: {name}"),
            Self::NoRuntime => write!(f, "WebSocket requires a running tokio runtime"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            _ => None,
        }
    }
}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        let kind = match e {
            WsError::UnsupportedScheme(_)
            | WsError::InvalidProtocol(_)
            | WsError::InvalidHeader(_) => crate::error::Kind::Validation,
            WsError::NoRuntime => crate::error::Kind::Internal,
            _ => crate::error::Kind::Transport,
        };
        crate::error::Error::with_source(kind, e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        crate::error::Error::with_source(crate::error::Kind::Transport, WsError::Connection(e))
    }
}
