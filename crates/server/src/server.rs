//! Viewer WebSocket server.
//!
//! Listens on a TCP port, upgrades every connection to WebSocket and hands
//! the viewer to the dispatcher. Any number of viewers may be connected.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::accept_async_with_config;
use tokio_util::sync::CancellationToken;

use lobbyhost_protocol::ViewerId;
use lobbyhost_protocol::constants::WS_MAX_MESSAGE_SIZE;

use crate::connection;
use crate::dispatcher::Inbound;
use crate::{DEFAULT_OUTBOUND_QUEUE, ServerError};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// First TCP port to try (0 = OS-assigned).
    pub port: u16,
    /// How many successive ports to try when the port is taken.
    pub port_attempts: u16,
    /// Frames that may wait in one viewer's queue before it is dropped.
    pub max_outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            port_attempts: 10,
            max_outbound_queue: DEFAULT_OUTBOUND_QUEUE,
        }
    }
}

/// The viewer WebSocket server.
pub struct LobbyServer {
    config: ServerConfig,
    inbound: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl LobbyServer {
    /// Creates a server that feeds `inbound`. Cancelling `cancel` stops the
    /// listener and every viewer connection.
    pub fn new(
        config: ServerConfig,
        inbound: mpsc::Sender<Inbound>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            inbound,
            cancel,
            local_addr: Mutex::new(None),
        })
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    /// Gracefully shuts down the server.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the server until cancellation.
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        let listener = self.bind().await?;

        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!("viewer server listening on {local_addr}");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("server shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let server = Arc::clone(self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                                    tracing::warn!(%peer_addr, "connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    /// Binds the configured port, moving on to the next one while the port
    /// is taken.
    async fn bind(&self) -> Result<TcpListener, ServerError> {
        let first = self.config.port;
        // An OS-assigned port never collides.
        let attempts = if first == 0 {
            1
        } else {
            self.config.port_attempts.max(1)
        };

        for offset in 0..attempts {
            let Some(port) = first.checked_add(offset) else {
                break;
            };
            let addr: SocketAddr = ([0, 0, 0, 0], port).into();
            match TcpListener::bind(addr).await {
                Ok(listener) => return Ok(listener),
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                    tracing::warn!(port, "port in use, trying next");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServerError::NoAvailablePort {
            port: first,
            attempts,
        })
    }

    /// Upgrades a TCP connection to WebSocket and starts its pumps.
    async fn handle_connection(
        self: &Arc<Self>,
        stream: tokio::net::TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let ws_stream = accept_async_with_config(stream, Some(ws_config)).await?;

        let viewer = ViewerId::new();
        tracing::info!(%viewer, %peer_addr, "websocket connection established");

        connection::spawn_connection(
            ws_stream,
            viewer,
            peer_addr,
            self.config.max_outbound_queue,
            self.inbound.clone(),
            self.cancel.clone(),
        )
        .await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    fn test_config(port: u16) -> ServerConfig {
        ServerConfig {
            port,
            port_attempts: 5,
            max_outbound_queue: 16,
        }
    }

    async fn start(
        config: ServerConfig,
    ) -> (
        Arc<LobbyServer>,
        mpsc::Receiver<Inbound>,
        tokio::task::JoinHandle<Result<(), ServerError>>,
    ) {
        let (tx, rx) = mpsc::channel(16);
        let server = LobbyServer::new(config, tx, CancellationToken::new());
        let server2 = Arc::clone(&server);
        let handle = tokio::spawn(async move { server2.run().await });

        // Wait for the server to bind.
        tokio::time::sleep(Duration::from_millis(50)).await;
        (server, rx, handle)
    }

    async fn next_inbound(rx: &mut mpsc::Receiver<Inbound>) -> Inbound {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn server_binds_dynamic_port() {
        let (server, _rx, handle) = start(test_config(0)).await;

        assert!(server.port().await > 0, "should have bound to a dynamic port");

        server.shutdown();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn taken_port_falls_back_to_next() {
        let blocker = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let taken = blocker.local_addr().unwrap().port();
        if taken == u16::MAX {
            return;
        }

        let (server, _rx, handle) = start(test_config(taken)).await;

        let port = server.port().await;
        assert!(port > taken && port < taken.saturating_add(5), "bound {port}");

        server.shutdown();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn viewer_frames_reach_the_dispatcher() {
        let (server, mut rx, handle) = start(test_config(0)).await;
        let url = format!("ws://127.0.0.1:{}", server.port().await);

        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let viewer = match next_inbound(&mut rx).await {
            Inbound::Connected { viewer, sender } => {
                sender.send_text(r#"{"type":"pong"}"#).unwrap();
                viewer
            }
            _ => panic!("expected a connected event"),
        };

        // Outbound frames reach the socket.
        let frame = ws.next().await.unwrap().unwrap();
        assert_eq!(frame.into_text().unwrap().as_str(), r#"{"type":"pong"}"#);

        ws.send(WsMessage::Text(r#"{"type":"ping"}"#.to_string().into()))
            .await
            .unwrap();
        match next_inbound(&mut rx).await {
            Inbound::Frame { viewer: from, text } => {
                assert_eq!(from, viewer);
                assert_eq!(text, r#"{"type":"ping"}"#);
            }
            _ => panic!("expected a frame"),
        }

        drop(ws);
        assert!(matches!(
            next_inbound(&mut rx).await,
            Inbound::Disconnected { viewer: gone } if gone == viewer
        ));

        server.shutdown();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn viewers_get_distinct_ids() {
        let (server, mut rx, handle) = start(test_config(0)).await;
        let url = format!("ws://127.0.0.1:{}", server.port().await);

        let (_a, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let (_b, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

        let mut ids = Vec::new();
        for _ in 0..2 {
            if let Inbound::Connected { viewer, .. } = next_inbound(&mut rx).await {
                ids.push(viewer);
            }
        }
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);

        server.shutdown();
        handle.await.unwrap().unwrap();
    }
}
