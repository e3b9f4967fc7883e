pub mod config;
pub mod error;
pub mod websocket;

use std::sync::Arc;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use websocket::{Relay, WebSocketServer};

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub relay: Arc<Relay>,
}

impl AppState {
    pub fn new(config: Settings) -> Self {
        let relay = Relay::new(config.relay.heartbeat_interval());

        Self {
            config: Arc::new(config),
            relay: Arc::new(relay),
        }
    }

    pub fn server(&self) -> Arc<WebSocketServer> {
        Arc::new(WebSocketServer::new(self.relay.clone()))
    }

    /// Closes every open transport.
    pub async fn shutdown(&self) -> Result<()> {
        self.relay.shutdown().await;
        Ok(())
    }
}
