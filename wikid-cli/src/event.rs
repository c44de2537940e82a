use tokio::sync::broadcast;
use tracing::{info, warn};

use wikid_engine::server::ServerEvent;

/// Spawns a task that logs server events until the server stops.
pub fn spawn_event_logger(mut events_rx: broadcast::Receiver<ServerEvent>) {
    tokio::spawn(async move {
        loop {
            match events_rx.recv().await {
                Ok(ServerEvent::Listening { addr }) => {
                    info!(addr = %addr, "Listening");
                }
                Ok(ServerEvent::ListeningStopped) => {
                    info!("Stopped accepting connections");
                }
                Ok(ServerEvent::RequestServed {
                    peer,
                    method,
                    path,
                    status,
                }) => {
                    println!("  {status} {method} {path}  ({peer})");
                }
                Ok(ServerEvent::Error { message }) => {
                    warn!(error = %message, "Server error");
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "Event logger fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
