use std::time::Duration;

use bon::Builder;

use crate::Result;
use crate::error::Error;

const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_HEARTBEAT_TIMEOUT_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_RECONNECT_INTERVAL_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_PING_PAYLOAD: &[u8] = b"keepalive";

/// Broadcast channel capacity for notifications.
const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Configuration for [`Supervisor`](crate::Supervisor) behavior.
///
/// ```
/// use std::time::Duration;
///
/// use ws_keepalive::Config;
///
/// let config = Config::builder()
///     .heartbeat_interval(Duration::from_secs(10))
///     .ping_payload("are-you-there")
///     .build();
///
/// assert_eq!(config.heartbeat_timeout, Duration::from_secs(30));
/// assert!(config.reconnect);
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Idle time after the last liveness signal before a PING is sent
    #[builder(default = DEFAULT_HEARTBEAT_INTERVAL_DURATION)]
    pub heartbeat_interval: Duration,
    /// Maximum time to wait after a PING before the connection is considered dead
    #[builder(default = DEFAULT_HEARTBEAT_TIMEOUT_DURATION)]
    pub heartbeat_timeout: Duration,
    /// Fixed delay between a close and the next connection attempt
    #[builder(default = DEFAULT_RECONNECT_INTERVAL_DURATION)]
    pub reconnect_interval: Duration,
    /// Payload carried by every PING frame
    #[builder(into, default = DEFAULT_PING_PAYLOAD.to_vec())]
    pub ping_payload: Vec<u8>,
    /// Whether a close is followed by a reconnection attempt. Can be changed later through
    /// [`Supervisor::set_reconnect`](crate::Supervisor::set_reconnect).
    #[builder(default = true)]
    pub reconnect: bool,
    /// Number of notifications a slow subscriber may fall behind before it lags
    #[builder(default = DEFAULT_EVENT_CAPACITY)]
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Config {
    /// Check that every interval is non-zero and that notifications can be buffered.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("heartbeat_interval", self.heartbeat_interval),
            ("heartbeat_timeout", self.heartbeat_timeout),
            ("reconnect_interval", self.reconnect_interval),
        ];

        if let Some((name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(Error::validation(format!("{name} must be non-zero")));
        }

        if self.event_capacity == 0 {
            return Err(Error::validation("event_capacity must be non-zero"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Kind;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();

        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(30));
        assert_eq!(config.reconnect_interval, Duration::from_secs(1));
        assert_eq!(config.ping_payload, b"keepalive".to_vec());
        assert!(config.reconnect, "reconnect should be enabled by default");
        assert_eq!(config.event_capacity, 1024);
    }

    #[test]
    fn builder_overrides_single_field() {
        let config = Config::builder()
            .reconnect_interval(Duration::from_millis(50))
            .ping_payload("x")
            .reconnect(false)
            .build();

        assert_eq!(config.reconnect_interval, Duration::from_millis(50));
        assert_eq!(config.ping_payload, b"x".to_vec());
        assert!(!config.reconnect, "reconnect override should stick");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
    }

    #[test]
    fn validate_accepts_defaults() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let config = Config::builder().heartbeat_timeout(Duration::ZERO).build();

        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), Kind::Validation);
        assert!(err.to_string().contains("heartbeat_timeout"));
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let config = Config::builder().event_capacity(0).build();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("event_capacity"));
    }
}
