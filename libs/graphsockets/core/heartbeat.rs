//! Client heartbeat
//!
//! A dedicated task ticks at the configured interval and hands a ping frame
//! to the connection's reader, which writes it to the socket:
//!
//! ```text
//! ┌─────────────────────┐
//! │  Heartbeat Task     │
//! │  Every X interval:  │
//! │  send ClientFrame ──┼──> mpsc ──> Dispatch loop ──> codec ──> WebSocket
//! └─────────────────────┘
//! ```
//!
//! Only started for vocabularies that define a client ping. The task exits
//! when the receiving side is dropped, i.e. when the dispatch loop ends.

use crate::protocol::frame::ClientFrame;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

pub async fn heartbeat_task(interval: Duration, heartbeat_tx: mpsc::UnboundedSender<ClientFrame>) {
    let mut ticker = tokio::time::interval(interval);
    // Skip the first immediate tick
    ticker.tick().await;
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    debug!("Heartbeat task started with interval: {:?}", interval);

    loop {
        ticker.tick().await;
        if heartbeat_tx.send(ClientFrame::Ping { payload: None }).is_err() {
            break;
        }
    }

    debug!("Heartbeat task exiting");
}

/// Spawn a heartbeat task, returning its handle and the frame receiver
pub fn spawn_heartbeat(interval: Duration) -> (JoinHandle<()>, mpsc::UnboundedReceiver<ClientFrame>) {
    let (heartbeat_tx, heartbeat_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(heartbeat_task(interval, heartbeat_tx));
    (handle, heartbeat_rx)
}
