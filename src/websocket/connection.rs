use std::net::SocketAddr;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, trace, warn};
use uuid::Uuid;

use crate::error::WebSocketError;
use crate::websocket::Relay;

/// Reader side of one client connection.
pub struct Connection {
    id: Uuid,
    peer_addr: SocketAddr,
    relay: Arc<Relay>,
}

impl Connection {
    pub fn new(id: Uuid, peer_addr: SocketAddr, relay: Arc<Relay>) -> Self {
        Self { id, peer_addr, relay }
    }

    /// Processes one inbound frame. Rejected frames are logged and dropped;
    /// only a close frame ends the connection.
    pub async fn handle_message(&self, msg: Message) -> Result<(), WebSocketError> {
        match msg {
            Message::Text(text) => {
                if let Err(e) = self.relay.handle_text(self.id, &text).await {
                    warn!("Dropped frame from connection {} ({}): {}", self.id, self.peer_addr, e);
                }
            }
            Message::Close(frame) => {
                info!("Client initiated close for connection {}: {:?}", self.id, frame);
                return Err(WebSocketError::ConnectionClosed("closed by client".to_string()));
            }
            // tungstenite answers pings on its own
            Message::Ping(_) | Message::Pong(_) => {
                trace!("Keep-alive frame on connection {}", self.id);
            }
            Message::Binary(data) => {
                warn!(
                    "Dropped binary frame of {} bytes from connection {}",
                    data.len(),
                    self.id
                );
            }
            Message::Frame(_) => {
                warn!("Received unsupported message type on connection {}", self.id);
            }
        }
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}
