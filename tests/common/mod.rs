#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Not every test binary uses every helper"
)]

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use ws_keepalive::error::Kind;
use ws_keepalive::{
    Connection, Connector, Error, Event, EventSink, Payload, Result, Target, TransportEvent,
};

/// What the supervisor did to one mock connection.
#[derive(Debug, Default)]
pub struct Probe {
    pub pings: Mutex<Vec<Vec<u8>>>,
    pub sent: Mutex<Vec<Payload>>,
    pub closes: AtomicUsize,
    closed: AtomicBool,
}

impl Probe {
    pub fn ping_count(&self) -> usize {
        self.pings.lock().unwrap().len()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct MockConnection {
    pub probe: Arc<Probe>,
    events: EventSink,
    fail_pings: bool,
}

impl Connection for MockConnection {
    fn send(&self, payload: Payload) -> Result<()> {
        self.probe.sent.lock().unwrap().push(payload);
        Ok(())
    }

    fn ping(&self, payload: &[u8]) -> Result<()> {
        if self.fail_pings {
            return Err(Error::with_source(
                Kind::Transport,
                io::Error::new(io::ErrorKind::BrokenPipe, "ping refused"),
            ));
        }
        self.probe.pings.lock().unwrap().push(payload.to_vec());
        Ok(())
    }

    /// Closes immediately on first call, like a transport whose peer is already gone.
    /// Later calls fail, which the supervisor must swallow.
    fn close(&self) -> Result<()> {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        if self.probe.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::with_source(
                Kind::Transport,
                io::Error::new(io::ErrorKind::NotConnected, "already closed"),
            ));
        }
        self.events.emit(TransportEvent::Close);
        Ok(())
    }
}

/// One call to [`Connector::connect`]. `probe` is `None` when construction failed.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub target: Target,
    pub events: EventSink,
    pub probe: Option<Arc<Probe>>,
}

#[derive(Debug, Default)]
struct Script {
    attempts: Mutex<Vec<Attempt>>,
    construction_failures: AtomicUsize,
    fail_pings: AtomicBool,
    manual_open: AtomicBool,
}

/// Scripted in-memory transport. Opens every connection immediately unless told otherwise.
#[derive(Debug, Clone, Default)]
pub struct MockConnector(Arc<Script>);

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` constructions fail synchronously.
    pub fn fail_constructions(&self, count: usize) {
        self.0.construction_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_pings(&self, fail: bool) {
        self.0.fail_pings.store(fail, Ordering::SeqCst);
    }

    /// Leave connections in the connecting state until the test emits `Open` itself.
    pub fn manual_open(&self) {
        self.0.manual_open.store(true, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.0.attempts.lock().unwrap().len()
    }

    pub fn attempt(&self, index: usize) -> Attempt {
        self.0.attempts.lock().unwrap()[index].clone()
    }

    pub fn last(&self) -> Attempt {
        self.0.attempts.lock().unwrap().last().cloned().unwrap()
    }

    /// Event sink of the most recent handle, for injecting transport events.
    pub fn events(&self) -> EventSink {
        self.last().events
    }

    pub fn probe(&self) -> Arc<Probe> {
        self.last().probe.unwrap()
    }
}

impl Connector for MockConnector {
    type Connection = MockConnection;

    fn connect(&self, target: &Target, events: EventSink) -> Result<MockConnection> {
        let refused = self
            .0
            .construction_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        let probe = (!refused).then(|| Arc::new(Probe::default()));
        self.0.attempts.lock().unwrap().push(Attempt {
            target: target.clone(),
            events: events.clone(),
            probe: probe.clone(),
        });

        let Some(probe) = probe else {
            return Err(Error::with_source(
                Kind::Transport,
                io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            ));
        };

        if !self.0.manual_open.load(Ordering::SeqCst) {
            events.emit(TransportEvent::Open);
        }

        Ok(MockConnection {
            probe,
            events,
            fail_pings: self.0.fail_pings.load(Ordering::SeqCst),
        })
    }
}

/// Everything currently buffered on `rx`.
pub fn drain<C>(rx: &mut broadcast::Receiver<Event<C>>) -> Vec<Event<C>> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
