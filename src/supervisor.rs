use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::Result;
use crate::config::Config;
use crate::error::{Error, Kind, NotConnected};
use crate::event::{Event, Warning};
use crate::heartbeat::{Alarm, Heartbeat};
use crate::transport::{Connection, Connector, EventSink, Payload, Target, TransportEvent};

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected, and no attempt is scheduled
    Disconnected,
    /// A connection handle exists and is waiting for its handshake
    Connecting {
        /// Consecutive attempts since the last successful open, this one included
        attempt: u32,
    },
    /// Successfully connected
    Connected {
        /// When the connection was established
        since: Instant,
    },
    /// Waiting out the reconnect interval
    Reconnecting {
        /// Number the next attempt will carry in [`ConnectionState::Connecting`]. Starts again
        /// at 1 after every successful open.
        attempt: u32,
    },
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

enum Command {
    /// Force-close the live connection, if any
    Close,
}

/// Keeps one connection to a [`Target`] alive.
///
/// A background task owns the connection and reacts to transport events one at a time:
/// - Every open, message or PONG restarts the idle countdown
/// - When the countdown runs out a PING is sent, and a missing reply closes the connection
/// - Every close is followed by a new attempt after the reconnect interval, unless reconnection
///   is disabled at that moment
///
/// Outcomes are reported as [`Event`]s. Nothing is ever returned as an error from the background
/// task. Dropping the last clone stops the task and closes the connection.
///
/// # Example
///
/// ```ignore
/// let (supervisor, mut events) =
///     Supervisor::start(
///         WebSocketConnector::new(),
///         Target::new("wss://example.com"),
///         Config::default(),
///     )?;
///
/// while let Ok(event) = events.recv().await {
///     match event {
///         Event::Open(_) => supervisor.send("hello")?,
///         Event::Warning(warning) => eprintln!("{warning}"),
///         _ => {}
///     }
/// }
/// ```
pub struct Supervisor<K: Connector> {
    command_tx: mpsc::UnboundedSender<Command>,
    event_tx: broadcast::Sender<Event<K::Connection>>,
    state_rx: watch::Receiver<ConnectionState>,
    connection_rx: watch::Receiver<Option<Arc<K::Connection>>>,
    reconnect: Arc<AtomicBool>,
    killed: Arc<AtomicBool>,
    /// Cancels the background task once the last clone is dropped
    shutdown: Arc<DropGuard>,
}

impl<K: Connector> Clone for Supervisor<K> {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            event_tx: self.event_tx.clone(),
            state_rx: self.state_rx.clone(),
            connection_rx: self.connection_rx.clone(),
            reconnect: Arc::clone(&self.reconnect),
            killed: Arc::clone(&self.killed),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl<K: Connector> Supervisor<K> {
    /// Validate `config`, spawn the background task and make the first connection attempt.
    ///
    /// The returned receiver is subscribed before the first attempt, so it observes every
    /// notification, including a construction failure on that attempt.
    ///
    /// Fails with [`Kind::Internal`] when called outside a tokio runtime.
    pub fn start(
        connector: K,
        target: Target,
        config: Config,
    ) -> Result<(Self, broadcast::Receiver<Event<K::Connection>>)> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| Error::with_source(Kind::Internal, e))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = broadcast::channel(config.event_capacity);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (connection_tx, connection_rx) = watch::channel(None);
        let reconnect = Arc::new(AtomicBool::new(config.reconnect));
        let killed = Arc::new(AtomicBool::new(false));
        let token = CancellationToken::new();

        let driver = Driver {
            heartbeat: Heartbeat::new(config.heartbeat_interval, config.heartbeat_timeout),
            connector,
            target,
            config,
            reconnect: Arc::clone(&reconnect),
            killed: Arc::clone(&killed),
            connection: None,
            generation: 0,
            attempt: 0,
            delays: JoinSet::new(),
            command_rx,
            transport_tx,
            transport_rx,
            event_tx: event_tx.clone(),
            state_tx,
            connection_tx,
            token: token.clone(),
        };

        runtime.spawn(driver.run());

        Ok((
            Self {
                command_tx,
                event_tx,
                state_rx,
                connection_rx,
                reconnect,
                killed,
                shutdown: Arc::new(token.drop_guard()),
            },
            event_rx,
        ))
    }

    /// Subscribe to notifications.
    ///
    /// Each call returns a new independent receiver that sees notifications sent from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event<K::Connection>> {
        self.event_tx.subscribe()
    }

    /// The live connection, if any.
    ///
    /// `None` before the first handle is created, after a construction failure and between a
    /// close and the next attempt.
    #[must_use]
    pub fn connection(&self) -> Option<Arc<K::Connection>> {
        self.connection_rx.borrow().clone()
    }

    /// Send a message on the live connection.
    pub fn send<P: Into<Payload>>(&self, payload: P) -> Result<()> {
        let connection = self.connection().ok_or(NotConnected)?;
        connection.send(payload.into())
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Enable or disable reconnection.
    ///
    /// Only changes the flag. The flag is read when a close arrives and again when the reconnect
    /// interval elapses, so disabling it also stops an attempt that is already waiting. Has no
    /// effect after [`Self::kill`].
    pub fn set_reconnect(&self, enabled: bool) {
        self.reconnect.store(enabled, Ordering::SeqCst);
    }

    /// Whether a close would currently be followed by a new attempt. Always `false` once
    /// [`Self::kill`] has been called.
    #[must_use]
    pub fn reconnect_enabled(&self) -> bool {
        self.reconnect.load(Ordering::SeqCst) && !self.killed.load(Ordering::SeqCst)
    }

    /// Permanently stop reconnecting and close the live connection.
    ///
    /// No connection is created afterwards, even for a close that is already in flight.
    pub fn kill(&self) {
        self.killed.store(true, Ordering::SeqCst);
        self.set_reconnect(false);
        _ = self.command_tx.send(Command::Close);
    }
}

/// Background task owning the connection, the heartbeat and pending reconnects.
struct Driver<K: Connector> {
    connector: K,
    target: Target,
    config: Config,
    reconnect: Arc<AtomicBool>,
    killed: Arc<AtomicBool>,
    connection: Option<Arc<K::Connection>>,
    /// Generation of `connection`. Events tagged with any other generation are stale.
    generation: u64,
    attempt: u32,
    heartbeat: Heartbeat,
    /// Reconnect delays. Each close arms its own.
    delays: JoinSet<()>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    transport_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
    transport_rx: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
    event_tx: broadcast::Sender<Event<K::Connection>>,
    state_tx: watch::Sender<ConnectionState>,
    connection_tx: watch::Sender<Option<Arc<K::Connection>>>,
    token: CancellationToken,
}

impl<K: Connector> Driver<K> {
    async fn run(mut self) {
        self.connect();

        loop {
            tokio::select! {
                () = self.token.cancelled() => break,
                command = self.command_rx.recv() => match command {
                    Some(Command::Close) => self.force_close(),
                    None => break,
                },
                Some((generation, event)) = self.transport_rx.recv() => {
                    self.on_transport_event(generation, event);
                }
                Some(_) = self.delays.join_next() => self.on_reconnect_due(),
                alarm = self.heartbeat.expired() => self.on_alarm(alarm),
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Supervisor dropped, shutting down");

        self.heartbeat.stop();
        self.delays.abort_all();
        self.force_close();
    }

    /// Create a brand-new connection handle, unwiring any previous one.
    fn connect(&mut self) {
        if let Some(previous) = self.connection.take() {
            Self::close_quietly(&previous);
        }
        self.heartbeat.stop();

        self.generation += 1;
        self.attempt = self.attempt.saturating_add(1);
        self.state_tx.send_replace(ConnectionState::Connecting {
            attempt: self.attempt,
        });

        #[cfg(feature = "tracing")]
        tracing::debug!(
            address = %self.target.address,
            attempt = self.attempt,
            generation = self.generation,
            "Connecting"
        );

        let events = EventSink::new(self.generation, self.transport_tx.clone());
        match self.connector.connect(&self.target, events) {
            Ok(connection) => {
                let connection = Arc::new(connection);
                self.connection = Some(Arc::clone(&connection));
                self.connection_tx.send_replace(Some(connection));
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "Unable to create connection");

                self.connection_tx.send_replace(None);
                self.emit(Event::Error(Arc::new(e)));
                self.schedule_reconnect();
            }
        }
    }

    fn on_transport_event(&mut self, generation: u64, event: TransportEvent) {
        if generation != self.generation || self.connection.is_none() {
            #[cfg(feature = "tracing")]
            tracing::trace!(generation, ?event, "Discarding event from superseded connection");
            return;
        }

        match event {
            TransportEvent::Open => {
                self.attempt = 0;
                self.state_tx.send_replace(ConnectionState::Connected {
                    since: Instant::now(),
                });
                if let Some(connection) = &self.connection {
                    self.emit(Event::Open(Arc::clone(connection)));
                }
                self.heartbeat.restart_idle();
            }
            TransportEvent::Message(payload) => {
                self.heartbeat.restart_idle();
                self.emit(Event::Message(payload));
            }
            TransportEvent::Pong(_) => self.heartbeat.restart_idle(),
            TransportEvent::Error(e) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %e, "Transport error");

                self.emit(Event::Error(Arc::new(e)));
            }
            TransportEvent::Close => {
                self.heartbeat.stop();
                self.connection = None;
                self.connection_tx.send_replace(None);
                self.emit(Event::Closed);
                self.schedule_reconnect();
            }
        }
    }

    fn on_alarm(&mut self, alarm: Alarm) {
        match alarm {
            Alarm::Idle => self.send_probe(),
            Alarm::Response => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Heartbeat timeout: no liveness signal within {:?}",
                    self.config.heartbeat_timeout
                );

                self.on_heartbeat_failure();
            }
        }
    }

    fn send_probe(&mut self) {
        let Some(connection) = &self.connection else {
            return;
        };

        match connection.ping(&self.config.ping_payload) {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::trace!("PING sent");

                self.heartbeat.await_response();
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "Unable to send PING");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;

                self.on_heartbeat_failure();
            }
        }
    }

    /// Report the failure and close. Reconnecting is left to the resulting close event.
    fn on_heartbeat_failure(&mut self) {
        self.emit(Event::Warning(Warning::HeartbeatFailure));
        self.heartbeat.stop();
        self.force_close();
    }

    fn force_close(&self) {
        if let Some(connection) = &self.connection {
            Self::close_quietly(connection);
        }
    }

    fn close_quietly(connection: &K::Connection) {
        if let Err(e) = connection.close() {
            #[cfg(feature = "tracing")]
            tracing::trace!(error = %e, "Ignoring error while closing connection");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
    }

    fn reconnect_enabled(&self) -> bool {
        self.reconnect.load(Ordering::SeqCst) && !self.killed.load(Ordering::SeqCst)
    }

    fn schedule_reconnect(&mut self) {
        if !self.reconnect_enabled() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Reconnection disabled, staying disconnected");

            self.state_tx.send_replace(ConnectionState::Disconnected);
            return;
        }

        let delay = self.config.reconnect_interval;

        #[cfg(feature = "tracing")]
        tracing::debug!(?delay, "Scheduling reconnect");

        self.state_tx.send_replace(ConnectionState::Reconnecting {
            attempt: self.attempt.saturating_add(1),
        });
        self.delays.spawn(sleep(delay));
    }

    fn on_reconnect_due(&mut self) {
        // Re-read so that `kill` or `set_reconnect(false)` during the delay wins.
        if !self.reconnect_enabled() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Reconnection disabled while waiting, dropping attempt");

            self.state_tx.send_replace(ConnectionState::Disconnected);
            return;
        }

        self.connect();
    }

    fn emit(&self, event: Event<K::Connection>) {
        _ = self.event_tx.send(event);
    }
}
