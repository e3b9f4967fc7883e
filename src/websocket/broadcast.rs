use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use crate::error::RelayError;
use crate::websocket::protocol::{ClientMessage, Presence};
use crate::websocket::registry::{ConnectionId, ConnectionState, Registry};

/// One outbound text frame and the connections it goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub recipients: Vec<ConnectionId>,
    pub content: String,
}

/// Applies `message` from `sender` to the registry and returns what has to
/// be sent. Performs no I/O.
pub fn dispatch(
    registry: &mut Registry,
    sender: ConnectionId,
    message: ClientMessage,
) -> Result<Delivery, RelayError> {
    match message {
        ClientMessage::Join { room_id } => {
            let identity = registry.assign_room(sender, &room_id)?;
            info!("User {} joined room {} on connection {}", identity, room_id, sender);

            // The newcomer is told the count as well.
            let recipients = registry.members_of(&room_id);
            let content = Presence::Joined(recipients.len()).to_string();
            Ok(Delivery { recipients, content })
        }
        ClientMessage::Chat { message } => {
            if registry.state(&sender) == ConnectionState::Closed {
                return Err(RelayError::UnknownConnection(sender));
            }
            let room = registry
                .lookup_room(&sender)
                .ok_or(RelayError::NotJoined)?
                .to_string();
            info!("Message in room {} from connection {} ({} bytes)", room, sender, message.len());

            let recipients = registry
                .members_of(&room)
                .into_iter()
                .filter(|id| *id != sender)
                .collect();
            Ok(Delivery { recipients, content: message })
        }
    }
}

/// Notice for the members still in `room` after someone left, or `None`
/// when nobody is left to tell.
pub fn departure(registry: &Registry, room: &str) -> Option<Delivery> {
    let recipients = registry.members_of(room);
    if recipients.is_empty() {
        return None;
    }
    let content = Presence::Left(recipients.len()).to_string();
    Some(Delivery { recipients, content })
}

/// Shared entry point for connection tasks. Every registry mutation and the
/// fan-out that follows it happen under one lock, which keeps per-room
/// delivery order identical for all members.
#[derive(Debug)]
pub struct Relay {
    registry: Mutex<Registry>,
}

impl Relay {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            registry: Mutex::new(Registry::new(heartbeat_interval)),
        }
    }

    pub async fn register(&self, tx: mpsc::UnboundedSender<Message>) -> ConnectionId {
        self.registry.lock().await.register(tx)
    }

    /// Handles one inbound text frame. Returns the number of members the
    /// resulting frame was queued for.
    pub async fn handle_text(&self, id: ConnectionId, text: &str) -> Result<usize, RelayError> {
        let message = ClientMessage::parse(text)?;
        let mut registry = self.registry.lock().await;
        let delivery = dispatch(&mut registry, id, message)?;
        Ok(registry.deliver(&delivery))
    }

    /// Removes the connection and tells the rest of its room. Returns the
    /// number of members notified; repeated calls notify nobody.
    pub async fn disconnect(&self, id: ConnectionId) -> usize {
        let mut registry = self.registry.lock().await;
        let Some(room) = registry.remove(&id) else {
            return 0;
        };

        match departure(&registry, &room) {
            Some(delivery) => registry.deliver(&delivery),
            None => {
                info!("Room {} is now empty", room);
                0
            }
        }
    }

    /// Closes every transport. Used once, on process shutdown.
    pub async fn shutdown(&self) -> usize {
        let closed = self.registry.lock().await.close_all();
        if closed > 0 {
            warn!("Closed {} active connection(s) on shutdown", closed);
        }
        closed
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.lock().await.connection_count()
    }

    pub async fn room_size(&self, room: &str) -> usize {
        self.registry.lock().await.room_size(room)
    }
}
