use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};
use uuid::Uuid;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Periodic WebSocket ping for one connection.
///
/// The probe only keeps traffic flowing; a dead peer shows up as a failed
/// read or write on the socket, which runs the normal removal path. The
/// task is aborted when the handle is dropped, so it lives exactly as long
/// as the registry entry that owns it.
#[derive(Debug)]
pub struct Heartbeat {
    connection_id: Uuid,
    handle: JoinHandle<()>,
}

impl Heartbeat {
    pub fn start(
        connection_id: Uuid,
        tx: mpsc::UnboundedSender<Message>,
        period: Duration,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                trace!("Sending heartbeat to connection {}", connection_id);
                if tx.send(Message::Ping(Vec::new())).is_err() {
                    debug!("Heartbeat stopped for connection {}: transport closed", connection_id);
                    break;
                }
            }
        });

        Self { connection_id, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
        debug!("Cancelled heartbeat for connection {}", self.connection_id);
    }
}
