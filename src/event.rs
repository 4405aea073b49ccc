use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::transport::Payload;

/// Notification delivered to every subscriber of a [`Supervisor`](crate::Supervisor).
#[non_exhaustive]
#[derive(Debug)]
pub enum Event<C> {
    /// A new connection was established
    Open(Arc<C>),
    /// A message arrived on the live connection. The payload is passed through untouched.
    Message(Payload),
    /// Non-fatal condition, the supervisor recovers on its own
    Warning(Warning),
    /// Construction or transport error
    Error(Arc<Error>),
    /// The live connection closed
    Closed,
}

impl<C> Clone for Event<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Open(connection) => Self::Open(Arc::clone(connection)),
            Self::Message(payload) => Self::Message(payload.clone()),
            Self::Warning(warning) => Self::Warning(*warning),
            Self::Error(error) => Self::Error(Arc::clone(error)),
            Self::Closed => Self::Closed,
        }
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    /// A PING went unanswered, or could not be sent. The connection is being closed.
    HeartbeatFailure,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeartbeatFailure => write!(f, "Heartbeat failure."),
        }
    }
}
