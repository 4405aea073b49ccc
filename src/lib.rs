#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod config;
pub mod error;
pub mod event;
pub(crate) mod heartbeat;
pub mod supervisor;
pub mod transport;
#[cfg(feature = "tungstenite")]
pub mod ws;

pub use config::Config;
pub use error::Error;
pub use event::{Event, Warning};
pub use supervisor::{ConnectionState, Supervisor};
pub use transport::{
    Connection, Connector, EventSink, Payload, Target, TransportEvent, TransportOptions,
};

pub type Result<T> = std::result::Result<T, Error>;
