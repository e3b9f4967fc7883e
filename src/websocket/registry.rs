use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::RelayError;
use crate::websocket::broadcast::Delivery;
use crate::websocket::heartbeat::Heartbeat;

pub type ConnectionId = Uuid;

const IDENTITY_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const IDENTITY_LEN: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unjoined,
    Joined,
    Closed,
}

#[derive(Debug)]
struct Member {
    identity: Option<String>,
    room: Option<String>,
    tx: mpsc::UnboundedSender<Message>,
    connected_at: DateTime<Utc>,
    _heartbeat: Heartbeat,
}

/// Every live connection, plus a `room -> members` index kept in step with
/// it. A room key exists only while its member set is non-empty.
#[derive(Debug)]
pub struct Registry {
    connections: HashMap<ConnectionId, Member>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
    heartbeat_interval: Duration,
}

impl Registry {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            connections: HashMap::new(),
            rooms: HashMap::new(),
            heartbeat_interval,
        }
    }

    /// Admits a connection with no room and starts its heartbeat.
    /// Must be called from within a tokio runtime.
    pub fn register(&mut self, tx: mpsc::UnboundedSender<Message>) -> ConnectionId {
        let id = Uuid::new_v4();
        let heartbeat = Heartbeat::start(id, tx.clone(), self.heartbeat_interval);

        self.connections.insert(
            id,
            Member {
                identity: None,
                room: None,
                tx,
                connected_at: Utc::now(),
                _heartbeat: heartbeat,
            },
        );
        info!("Added connection {} to registry", id);
        id
    }

    /// Puts the connection in `room`. A room can be set once per connection.
    /// Returns the identity generated for the member.
    pub fn assign_room(&mut self, id: ConnectionId, room: &str) -> Result<String, RelayError> {
        if room.is_empty() {
            return Err(RelayError::MissingRoomId);
        }
        let member = self
            .connections
            .get_mut(&id)
            .ok_or(RelayError::UnknownConnection(id))?;
        if let Some(current) = &member.room {
            return Err(RelayError::AlreadyJoined(current.clone()));
        }

        let identity = generate_identity();
        member.identity = Some(identity.clone());
        member.room = Some(room.to_string());
        self.rooms.entry(room.to_string()).or_default().insert(id);

        Ok(identity)
    }

    pub fn lookup_room(&self, id: &ConnectionId) -> Option<&str> {
        self.connections.get(id)?.room.as_deref()
    }

    pub fn identity(&self, id: &ConnectionId) -> Option<&str> {
        self.connections.get(id)?.identity.as_deref()
    }

    pub fn members_of(&self, room: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn room_size(&self, room: &str) -> usize {
        self.rooms.get(room).map_or(0, HashSet::len)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn state(&self, id: &ConnectionId) -> ConnectionState {
        match self.connections.get(id) {
            Some(member) if member.room.is_some() => ConnectionState::Joined,
            Some(_) => ConnectionState::Unjoined,
            None => ConnectionState::Closed,
        }
    }

    /// Detaches the connection and returns the room it was in. Dropping the
    /// entry cancels its heartbeat. Calling this again for the same id is a
    /// no-op returning `None`.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<String> {
        let member = self.connections.remove(id)?;
        let seconds = (Utc::now() - member.connected_at).num_seconds();

        let Some(room) = member.room else {
            info!("Removed connection {} (not in any room) after {}s", id, seconds);
            return None;
        };
        if let Some(members) = self.rooms.get_mut(&room) {
            members.remove(id);
            if members.is_empty() {
                self.rooms.remove(&room);
            }
        }
        info!(
            "Removed connection {} ({}) from room {} after {}s",
            id,
            member.identity.as_deref().unwrap_or("-"),
            room,
            seconds
        );
        Some(room)
    }

    /// Queues `delivery` on each recipient's transport without waiting on
    /// any of them. Returns how many sends were accepted.
    pub fn deliver(&self, delivery: &Delivery) -> usize {
        let mut delivered = 0;
        for id in &delivery.recipients {
            let Some(member) = self.connections.get(id) else {
                continue;
            };
            match member.tx.send(Message::Text(delivery.content.clone())) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Failed to send to connection {}: {}", id, e),
            }
        }
        delivered
    }

    /// Sends a close frame to every connection and drops all entries,
    /// cancelling their heartbeats. No departure notices are produced.
    pub fn close_all(&mut self) -> usize {
        let closed = self.connections.len();
        for (id, member) in self.connections.drain() {
            if member.tx.send(Message::Close(None)).is_err() {
                warn!("Connection {} was already gone at shutdown", id);
            }
        }
        self.rooms.clear();
        closed
    }
}

fn generate_identity() -> String {
    let mut rng = rand::thread_rng();
    (0..IDENTITY_LEN)
        .map(|_| IDENTITY_ALPHABET[rng.gen_range(0..IDENTITY_ALPHABET.len())] as char)
        .collect()
}
