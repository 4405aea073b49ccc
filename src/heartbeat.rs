//! Idle/response timer pair that decides when to probe a connection and when to give up on it.

use std::future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Sleep, sleep};

/// Which countdown expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Alarm {
    /// No liveness signal for the heartbeat interval, time to send a PING
    Idle,
    /// A PING went unanswered for the heartbeat timeout
    Response,
}

/// Single timer slot shared by both countdowns.
///
/// Arming either countdown replaces whatever was pending, so at most one alarm is ever armed.
#[derive(Debug)]
pub(crate) struct Heartbeat {
    interval: Duration,
    timeout: Duration,
    pending: Option<(Alarm, Pin<Box<Sleep>>)>,
}

impl Heartbeat {
    pub(crate) fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            pending: None,
        }
    }

    /// Liveness signal: cancel any countdown and wait a full interval before the next PING.
    pub(crate) fn restart_idle(&mut self) {
        self.arm(Alarm::Idle, self.interval);
    }

    /// A PING went out: cancel any countdown and wait for a response.
    pub(crate) fn await_response(&mut self) {
        self.arm(Alarm::Response, self.timeout);
    }

    pub(crate) fn stop(&mut self) {
        self.pending = None;
    }

    /// The armed alarm and its deadline, if any.
    #[cfg(test)]
    pub(crate) fn armed(&self) -> Option<(Alarm, tokio::time::Instant)> {
        self.pending
            .as_ref()
            .map(|(alarm, sleep)| (*alarm, sleep.deadline()))
    }

    fn arm(&mut self, alarm: Alarm, after: Duration) {
        self.stop();
        self.pending = Some((alarm, Box::pin(sleep(after))));
    }

    /// Resolve when the armed alarm fires, disarming it. Never resolves while nothing is armed.
    ///
    /// Cancel safe: dropping the future leaves the alarm armed.
    pub(crate) async fn expired(&mut self) -> Alarm {
        let Some((alarm, sleep)) = self.pending.as_mut() else {
            return future::pending().await;
        };

        sleep.as_mut().await;
        let alarm = *alarm;
        self.pending = None;
        alarm
    }
}
