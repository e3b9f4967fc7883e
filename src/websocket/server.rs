use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::{AppError, WebSocketError};
use crate::websocket::{Connection, Relay};

pub struct WebSocketServer {
    relay: Arc<Relay>,
}

impl WebSocketServer {
    pub fn new(relay: Arc<Relay>) -> Self {
        Self { relay }
    }

    /// Accepts connections until `shutdown` resolves. Open connections are
    /// left to the caller to close through the relay.
    pub async fn run<F>(self: Arc<Self>, listener: TcpListener, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()>,
    {
        let local_addr = listener.local_addr()?;
        info!("Accepting WebSocket connections on ws://{}", local_addr);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let server = self.clone();
                        tokio::spawn(async move {
                            server.handle_connection(stream, addr).await;
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },
                _ = &mut shutdown => {
                    info!("Stopped accepting connections on {}", local_addr);
                    break;
                }
            }
        }

        Ok(())
    }

    pub async fn handle_connection(self: Arc<Self>, raw_stream: TcpStream, addr: SocketAddr) {
        info!("New client connected from: {}", addr);

        let ws_stream = match tokio_tungstenite::accept_async(raw_stream).await {
            Ok(ws) => ws,
            Err(e) => {
                error!("{}", WebSocketError::Handshake(e.to_string()));
                return;
            }
        };

        let (ws_sink, ws_stream) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();

        let connection_id = self.relay.register(tx).await;
        let connection = Connection::new(connection_id, addr, self.relay.clone());

        // Forward queued frames to the socket. Ends once every sender (the
        // registry entry and its heartbeat) is gone or the socket fails.
        let mut send_task = tokio::spawn(async move {
            let mut ws_sink = ws_sink;
            let mut rx = rx;

            while let Some(message) = rx.recv().await {
                if let Err(e) = ws_sink.send(message).await {
                    error!("Error sending to connection {}: {}", connection_id, WebSocketError::from(e));
                    break;
                }
            }

            if let Err(e) = ws_sink.close().await {
                debug!("Error closing connection {}: {}", connection_id, e);
            }
        });

        let mut receive_task = tokio::spawn(async move {
            let mut ws_stream = ws_stream;

            while let Some(message) = ws_stream.next().await {
                let result = match message {
                    Ok(msg) => connection.handle_message(msg).await,
                    Err(e) => Err(WebSocketError::from(e)),
                };
                match result {
                    Ok(()) => {}
                    Err(WebSocketError::ConnectionClosed(_)) => break,
                    Err(e) => {
                        error!("Error receiving from connection {}: {}", connection.id(), e);
                        break;
                    }
                }
            }
        });

        tokio::select! {
            _ = &mut send_task => {
                info!("Send task completed for connection {}", connection_id);
                receive_task.abort();
            }
            _ = &mut receive_task => {
                info!("Receive task completed for connection {}", connection_id);
            }
        }

        self.relay.disconnect(connection_id).await;
        info!("Connection {} from {} closed", connection_id, addr);
    }

    pub fn relay(&self) -> Arc<Relay> {
        self.relay.clone()
    }
}
