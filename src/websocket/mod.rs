//! WebSocket relay: connection registry, room broadcast, liveness.
//!
//! Each client joins one room and every chat it sends is relayed to the
//! other members of that room. Rooms exist only while someone is in them.

mod broadcast;
mod connection;
mod heartbeat;
mod protocol;
mod registry;
mod server;

pub use broadcast::{departure, dispatch, Delivery, Relay};
pub use connection::Connection;
pub use heartbeat::{Heartbeat, HEARTBEAT_INTERVAL};
pub use protocol::{ClientMessage, Presence};
pub use registry::{ConnectionId, ConnectionState, Registry};
pub use server::WebSocketServer;
