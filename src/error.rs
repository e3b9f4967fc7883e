use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Relay error: {0}")]
    RelayError(#[from] RelayError),

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] WebSocketError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

// Implement conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

/// Reasons an inbound frame is dropped. None of these close the connection
/// and none are reported back to the peer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Room ID missing in join request")]
    MissingRoomId,

    #[error("Message content missing in chat request")]
    MissingMessage,

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Connection has not joined a room")]
    NotJoined,

    #[error("Connection already joined room {0}")]
    AlreadyJoined(String),

    #[error("Unknown connection {0}")]
    UnknownConnection(Uuid),
}

#[derive(Error, Debug)]
pub enum WebSocketError {
    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Message sending failed: {0}")]
    SendError(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for WebSocketError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                WebSocketError::ConnectionClosed(err.to_string())
            }
            _ => WebSocketError::Protocol(err.to_string()),
        }
    }
}
