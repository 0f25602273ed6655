//! Viewer connection management: read/write pumps, ping/pong, bounded send
//! queue.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use lobbyhost_protocol::ViewerId;
use lobbyhost_protocol::constants::{WS_MAX_MESSAGE_SIZE, WS_PING_PERIOD, WS_PONG_WAIT};

use crate::dispatcher::Inbound;

/// Handle for queueing frames to one viewer.
///
/// Cloneable and cheap; wraps an `mpsc::Sender` plus the connection's
/// cancel token.
#[derive(Clone)]
pub struct Sender {
    tx: mpsc::Sender<WsMessage>,
    cancel: CancellationToken,
}

impl Sender {
    pub(crate) fn new(tx: mpsc::Sender<WsMessage>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// Queues a JSON text frame without waiting.
    pub fn send_text(&self, json: &str) -> Result<(), SendError> {
        self.tx
            .try_send(WsMessage::Text(json.to_owned().into()))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SendError::Full,
                mpsc::error::TrySendError::Closed(_) => SendError::Closed,
            })
    }

    /// Returns `true` if the connection is still open.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed() && !self.cancel.is_cancelled()
    }

    /// Stops both pumps; the socket is closed by the write pump.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// Error returned when a frame cannot be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("send queue full")]
    Full,
    #[error("connection closed")]
    Closed,
}

/// Runs the read and write pumps for an upgraded viewer socket.
///
/// The viewer is announced to the dispatcher with [`Inbound::Connected`]
/// before any of its frames, and [`Inbound::Disconnected`] is sent once the
/// read pump exits.
pub(crate) async fn spawn_connection<S>(
    ws_stream: S,
    viewer: ViewerId,
    peer_addr: SocketAddr,
    queue: usize,
    inbound: mpsc::Sender<Inbound>,
    server_cancel: CancellationToken,
) where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error>
        + Send
        + 'static,
{
    let (tx, rx) = mpsc::channel::<WsMessage>(queue.max(1));
    let cancel = server_cancel.child_token();
    let sender = Sender::new(tx, cancel.clone());

    if inbound
        .send(Inbound::Connected {
            viewer,
            sender: sender.clone(),
        })
        .await
        .is_err()
    {
        tracing::warn!(%viewer, "dispatcher gone, dropping viewer");
        return;
    }

    let (ws_sink, ws_stream) = ws_stream.split();

    tokio::spawn(write_pump(ws_sink, rx, cancel.clone()));

    tokio::spawn(async move {
        read_pump(ws_stream, viewer, &sender, &inbound, cancel.clone()).await;
        // When the read pump exits, stop the write pump too.
        cancel.cancel();
        let _ = inbound.send(Inbound::Disconnected { viewer }).await;
        tracing::info!(%viewer, %peer_addr, "viewer disconnected");
    });
}

/// Write pump: drains the send queue and sends WS pings.
async fn write_pump<S>(mut sink: S, mut rx: mpsc::Receiver<WsMessage>, cancel: CancellationToken)
where
    S: futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Send + Unpin,
{
    let mut ping_interval = tokio::time::interval(WS_PING_PERIOD);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = rx.recv() => {
                match msg {
                    Some(ws_msg) => {
                        if let Err(e) = sink.send(ws_msg).await {
                            tracing::error!("write pump send error: {e}");
                            break;
                        }
                    }
                    None => break,
                }
            }

            _ = ping_interval.tick() => {
                if let Err(e) = sink.send(WsMessage::Ping(Vec::new().into())).await {
                    tracing::error!("write pump ping error: {e}");
                    break;
                }
            }
        }
    }

    // Best-effort close frame.
    let _ = sink.close().await;
}

/// Read pump: forwards text frames to the dispatcher.
async fn read_pump<S>(
    mut stream: S,
    viewer: ViewerId,
    sender: &Sender,
    inbound: &mpsc::Sender<Inbound>,
    cancel: CancellationToken,
) where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Send
        + Unpin,
{
    let mut pong_deadline = tokio::time::interval(WS_PONG_WAIT);
    pong_deadline.reset();
    let mut got_pong = true;

    loop {
        let text = tokio::select! {
            _ = cancel.cancelled() => break,

            _ = pong_deadline.tick() => {
                if !got_pong {
                    tracing::warn!(%viewer, "pong timeout, closing connection");
                    break;
                }
                got_pong = false;
                continue;
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => text.as_str().to_owned(),
                    // Binary frames carry the same JSON envelopes.
                    Some(Ok(WsMessage::Binary(data))) => String::from_utf8_lossy(&data).into_owned(),
                    Some(Ok(WsMessage::Pong(_))) => {
                        got_pong = true;
                        pong_deadline.reset();
                        continue;
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = sender.tx.try_send(WsMessage::Pong(data));
                        continue;
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        tracing::debug!(%viewer, "received close frame");
                        break;
                    }
                    Some(Ok(WsMessage::Frame(_))) => continue,
                    Some(Err(e)) => {
                        tracing::warn!(%viewer, "read pump error: {e}");
                        break;
                    }
                    None => break,
                }
            }
        };

        if text.len() > WS_MAX_MESSAGE_SIZE {
            tracing::error!(%viewer, "message exceeds max size ({} > {})", text.len(), WS_MAX_MESSAGE_SIZE);
            continue;
        }
        if inbound.send(Inbound::Frame { viewer, text }).await.is_err() {
            break;
        }
    }
}
