//! Registry of connected viewers.

use tracing::{debug, error, info, warn};

use lobbyhost_protocol::{ServerMessage, ViewerId};

use crate::connection::Sender;

/// Connected viewers in registration order.
///
/// Delivery never blocks: a viewer whose queue is full or closed is
/// unregistered and its connection closed.
#[derive(Default)]
pub struct BroadcastHub {
    viewers: Vec<(ViewerId, Sender)>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }

    pub fn contains(&self, viewer: ViewerId) -> bool {
        self.viewers.iter().any(|(id, _)| *id == viewer)
    }

    /// Adds a viewer. Returns `false` if it was already registered.
    pub fn register(&mut self, viewer: ViewerId, sender: Sender) -> bool {
        if self.contains(viewer) {
            debug!(%viewer, "viewer already registered");
            return false;
        }
        self.viewers.push((viewer, sender));
        info!(%viewer, total = self.viewers.len(), "viewer connected");
        true
    }

    /// Removes a viewer and closes its connection. Returns `false` if it
    /// was not registered.
    pub fn unregister(&mut self, viewer: ViewerId) -> bool {
        let Some(pos) = self.viewers.iter().position(|(id, _)| *id == viewer) else {
            return false;
        };
        let (_, sender) = self.viewers.remove(pos);
        sender.close();
        info!(%viewer, remaining = self.viewers.len(), "viewer removed");
        true
    }

    /// Sends to one viewer. Returns `true` if the message was queued.
    pub fn send_to(&mut self, viewer: ViewerId, message: &ServerMessage) -> bool {
        let Some(json) = encode(message) else {
            return false;
        };
        let Some((_, sender)) = self.viewers.iter().find(|(id, _)| *id == viewer) else {
            debug!(%viewer, kind = message.kind(), "viewer gone, dropping message");
            return false;
        };

        match sender.send_text(&json) {
            Ok(()) => true,
            Err(e) => {
                warn!(%viewer, kind = message.kind(), error = %e, "dropping viewer");
                self.unregister(viewer);
                false
            }
        }
    }

    /// Sends to every viewer in registration order. Returns the number of
    /// viewers the message was queued for.
    pub fn broadcast_all(&mut self, message: &ServerMessage) -> usize {
        let Some(json) = encode(message) else {
            return 0;
        };

        let mut failed = Vec::new();
        for (viewer, sender) in &self.viewers {
            if let Err(e) = sender.send_text(&json) {
                warn!(%viewer, kind = message.kind(), error = %e, "dropping viewer");
                failed.push(*viewer);
            }
        }
        for viewer in &failed {
            self.unregister(*viewer);
        }

        let delivered = self.viewers.len();
        debug!(kind = message.kind(), delivered, dropped = failed.len(), "broadcast");
        delivered
    }
}

fn encode(message: &ServerMessage) -> Option<String> {
    match message.to_json() {
        Ok(json) => Some(json),
        Err(e) => {
            error!(kind = message.kind(), "failed to encode message: {e}");
            None
        }
    }
}
