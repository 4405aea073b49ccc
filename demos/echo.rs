//! Keeps a connection to an echo server alive and prints every notification.
//!
//! Run with:
//! ```sh
//! RUST_LOG=debug cargo run --example echo --features tracing -- wss://echo.websocket.org
//! ```
//!
use std::time::Duration;

use tracing_subscriber::EnvFilter;
use ws_keepalive::ws::WebSocketConnector;
use ws_keepalive::{Config, Event, Supervisor, Target};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "wss://echo.websocket.org".to_owned());

    let config = Config::builder()
        .heartbeat_interval(Duration::from_secs(5))
        .heartbeat_timeout(Duration::from_secs(5))
        .reconnect_interval(Duration::from_secs(2))
        .build();

    let (supervisor, mut events) =
        Supervisor::start(WebSocketConnector::new(), Target::new(address), config)?;

    let stop = tokio::time::sleep(Duration::from_secs(60));
    tokio::pin!(stop);

    loop {
        tokio::select! {
            () = &mut stop => break,
            event = events.recv() => match event? {
                Event::Open(_) => {
                    tracing::info!("Connection open");
                    supervisor.send("hello")?;
                }
                Event::Message(payload) => tracing::info!(?payload, "Message"),
                Event::Warning(warning) => tracing::warn!(%warning),
                Event::Error(error) => tracing::error!(%error),
                Event::Closed => tracing::info!(state = ?supervisor.state(), "Connection closed"),
                _ => {}
            }
        }
    }

    supervisor.kill();
    tokio::time::sleep(Duration::from_millis(100)).await;

    Ok(())
}
