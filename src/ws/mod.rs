//! WebSocket transport built on `tokio-tungstenite`.
//!
//! [`WebSocketConnector`] plugs into [`Supervisor`](crate::Supervisor):
//!
//! ```ignore
//! let target = Target::builder()
//!     .address("wss://example.com/stream")
//!     .protocols(vec!["json".to_owned()])
//!     .build();
//!
//! let (supervisor, events) = Supervisor::start(WebSocketConnector::new(), target, config)?;
//! ```

pub mod connection;
pub mod error;

pub use connection::{ReadyState, WebSocket, WebSocketConnector};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
