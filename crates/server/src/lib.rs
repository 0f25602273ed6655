//! Viewer-facing side of lobbyhost.
//!
//! Accepts any number of viewers over WebSocket, fans session and catalog
//! notifications out through a [`BroadcastHub`], and routes every inbound
//! command through one [`Dispatcher`] loop.

mod connection;
mod dispatcher;
mod hub;
mod server;

pub use connection::{SendError, Sender};
pub use dispatcher::{Dispatcher, Inbound};
pub use hub::BroadcastHub;
pub use server::{LobbyServer, ServerConfig};

/// Default bound of a viewer's send queue.
///
/// A viewer whose queue fills up is dropped instead of stalling broadcasts
/// to everyone else.
pub const DEFAULT_OUTBOUND_QUEUE: usize = 256;

/// Errors produced by the viewer server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("no free port in {port}..+{attempts}")]
    NoAvailablePort { port: u16, attempts: u16 },

    #[error("session coordinator already attached to a dispatcher")]
    SessionAttached,
}
