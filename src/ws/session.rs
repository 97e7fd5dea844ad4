//! Websocket session adapter and socket pump.
//!
//! [`WsSession`] is the handle user handlers receive. Every operation on it
//! crosses the bridge: a command is shipped to the pump task on the server
//! loop, which owns the socket, and the caller suspends until the pump
//! acknowledges. Inbound traffic flows the other way, as a finite stream of
//! [`WsMsg`] values that ends when the connection closes.
//!
//! The adapter does not serialize concurrent callers: two tasks sending on
//! the same session race exactly as the underlying connection allows.

// ============================================================================
// Imports
// ============================================================================

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::Stream;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::SessionId;

// ============================================================================
// Constants
// ============================================================================

/// Close code sent when no explicit code is given (normal closure).
pub(crate) const DEFAULT_CLOSE_CODE: u16 = 1000;

/// How long the pump keeps draining after a close was initiated.
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// WsMsg
// ============================================================================

/// Close code and reason taken from a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// Close status code.
    pub code: u16,
    /// UTF-8 close reason.
    pub reason: String,
}

/// One inbound websocket message: kind tag plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMsg {
    /// Text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// The peer closed the connection. Final message of the stream.
    Close(Option<CloseInfo>),
    /// Data frame received after this side initiated a close.
    Closing,
    /// Transport error. Final message of the stream.
    Error(String),
}

// ============================================================================
// SessionCommand
// ============================================================================

/// Commands shipped from the session handle to the pump.
pub(crate) enum SessionCommand {
    /// Send a text frame.
    SendText {
        data: String,
        ack: oneshot::Sender<Result<()>>,
    },
    /// Send a binary frame.
    SendBytes {
        data: Vec<u8>,
        ack: oneshot::Sender<Result<()>>,
    },
    /// Send a close frame. `ack` is absent when issued from `Drop`.
    Close {
        code: u16,
        reason: String,
        ack: Option<oneshot::Sender<Result<()>>>,
    },
}

// ============================================================================
// WsSession
// ============================================================================

/// Websocket session handle passed to user handlers.
///
/// Send operations take `&self`; receiving takes `&mut self` (or the
/// [`Stream`] impl). Dropping the session closes the connection if nothing
/// else did.
pub struct WsSession {
    /// Session tag for log correlation.
    id: SessionId,
    /// Command channel into the pump.
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    /// Inbound message stream out of the pump.
    inbound: mpsc::UnboundedReceiver<WsMsg>,
    /// Set once a close has been issued, by whichever path got there first.
    closed: Arc<AtomicBool>,
}

impl WsSession {
    /// Creates a session over existing pump channels.
    pub(crate) fn new(
        id: SessionId,
        cmd_tx: mpsc::UnboundedSender<SessionCommand>,
        inbound: mpsc::UnboundedReceiver<WsMsg>,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            cmd_tx,
            inbound,
            closed,
        }
    }

    /// Returns the session identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Sends a text frame and waits until it is on the wire.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionClosed`] if the connection is gone
    pub async fn send_text(&self, data: impl Into<String>) -> Result<()> {
        let (ack, ack_rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::SendText {
                data: data.into(),
                ack,
            })
            .map_err(|_| Error::SessionClosed)?;
        ack_rx.await.map_err(|_| Error::SessionClosed)?
    }

    /// Sends a binary frame and waits until it is on the wire.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionClosed`] if the connection is gone
    pub async fn send_bytes(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        let (ack, ack_rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::SendBytes {
                data: data.into(),
                ack,
            })
            .map_err(|_| Error::SessionClosed)?;
        ack_rx.await.map_err(|_| Error::SessionClosed)?
    }

    /// Serializes a value to JSON and sends it as a text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if serialization fails
    /// - [`Error::SessionClosed`] if the connection is gone
    pub async fn send_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.send_text(json).await
    }

    /// Closes the connection with a normal-closure code.
    ///
    /// Idempotent: once any path has issued a close, further calls return
    /// without touching the connection.
    ///
    /// # Errors
    ///
    /// Currently infallible; returns [`Result`] for forward compatibility.
    pub async fn close(&self) -> Result<()> {
        self.close_with(DEFAULT_CLOSE_CODE, "").await
    }

    /// Closes the connection with an explicit code and reason.
    ///
    /// See [`close`](Self::close) for idempotency.
    ///
    /// # Errors
    ///
    /// Currently infallible; returns [`Result`] for forward compatibility.
    pub async fn close_with(&self, code: u16, reason: impl Into<String>) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let (ack, ack_rx) = oneshot::channel();
        let sent = self.cmd_tx.send(SessionCommand::Close {
            code,
            reason: reason.into(),
            ack: Some(ack),
        });

        // A vanished pump means the connection is already down, which is
        // what a close asks for.
        if sent.is_ok() {
            let _ = ack_rx.await;
        }

        Ok(())
    }

    /// Receives the next inbound message.
    ///
    /// Returns `None` once the connection has closed and the stream is
    /// exhausted; the stream does not restart.
    pub async fn recv(&mut self) -> Option<WsMsg> {
        self.inbound.recv().await
    }
}

impl Stream for WsSession {
    type Item = WsMsg;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<WsMsg>> {
        self.inbound.poll_recv(cx)
    }
}

impl Drop for WsSession {
    fn drop(&mut self) {
        // Covers handlers that return (or are cancelled) without closing.
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.cmd_tx.send(SessionCommand::Close {
                code: DEFAULT_CLOSE_CODE,
                reason: String::new(),
                ack: None,
            });
        }
    }
}

impl std::fmt::Debug for WsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsSession")
            .field("id", &self.id)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Pump
// ============================================================================

/// Socket pump: runs on the server loop and owns the connection.
///
/// Terminates when the peer closes, the transport fails, or — after a close
/// was initiated — the drain window elapses.
pub(crate) async fn pump(
    mut socket: WebSocket,
    mut cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    inbound_tx: mpsc::UnboundedSender<WsMsg>,
    id: SessionId,
) {
    let mut closing = false;
    let mut cmd_done = false;

    loop {
        // After a close, only drain the socket, and not forever.
        if closing && cmd_done {
            drain(socket, inbound_tx, id).await;
            return;
        }

        tokio::select! {
            cmd = cmd_rx.recv(), if !cmd_done => {
                match cmd {
                    Some(SessionCommand::SendText { data, ack }) => {
                        let result = socket.send(Message::Text(data.into())).await;
                        let _ = ack.send(send_outcome(result, id));
                    }
                    Some(SessionCommand::SendBytes { data, ack }) => {
                        let result = socket.send(Message::Binary(data.into())).await;
                        let _ = ack.send(send_outcome(result, id));
                    }
                    Some(SessionCommand::Close { code, reason, ack }) => {
                        let frame = CloseFrame {
                            code,
                            reason: reason.into(),
                        };
                        let result = socket.send(Message::Close(Some(frame))).await;
                        debug!(session = %id, code, "close frame sent");
                        if let Some(ack) = ack {
                            let _ = ack.send(send_outcome(result, id));
                        }
                        closing = true;
                    }
                    None => {
                        // Session handle gone without a close command; the
                        // Drop impl makes this unreachable in practice, but
                        // a lost handle must still close the connection.
                        if !closing {
                            let _ = socket.send(Message::Close(None)).await;
                            closing = true;
                        }
                        cmd_done = true;
                    }
                }
            }

            msg = socket.recv() => {
                if deliver(msg, &inbound_tx, closing, id) {
                    return;
                }
            }
        }
    }
}

/// Drains remaining inbound frames after a close, bounded in time.
async fn drain(mut socket: WebSocket, inbound_tx: mpsc::UnboundedSender<WsMsg>, id: SessionId) {
    let deadline = tokio::time::Instant::now() + CLOSE_DRAIN_TIMEOUT;

    loop {
        let msg = match tokio::time::timeout_at(deadline, socket.recv()).await {
            Ok(msg) => msg,
            Err(_) => {
                warn!(session = %id, "close drain timed out");
                return;
            }
        };

        if deliver(msg, &inbound_tx, true, id) {
            return;
        }
    }
}

/// Forwards one socket read to the inbound channel.
///
/// Returns `true` when the stream has ended and the pump should stop.
fn deliver(
    msg: Option<std::result::Result<Message, axum::Error>>,
    inbound_tx: &mpsc::UnboundedSender<WsMsg>,
    closing: bool,
    id: SessionId,
) -> bool {
    match msg {
        Some(Ok(Message::Text(text))) => {
            let out = if closing {
                WsMsg::Closing
            } else {
                WsMsg::Text(text.as_str().to_owned())
            };
            let _ = inbound_tx.send(out);
            false
        }
        Some(Ok(Message::Binary(bytes))) => {
            let out = if closing {
                WsMsg::Closing
            } else {
                WsMsg::Binary(bytes.to_vec())
            };
            let _ = inbound_tx.send(out);
            false
        }
        Some(Ok(Message::Close(frame))) => {
            debug!(session = %id, "peer closed");
            let info = frame.map(|f| CloseInfo {
                code: f.code,
                reason: f.reason.as_str().to_owned(),
            });
            let _ = inbound_tx.send(WsMsg::Close(info));
            true
        }
        // The framework answers pings on its own.
        Some(Ok(Message::Ping(_) | Message::Pong(_))) => false,
        Some(Err(e)) => {
            warn!(session = %id, error = %e, "websocket transport error");
            let _ = inbound_tx.send(WsMsg::Error(e.to_string()));
            true
        }
        None => {
            debug!(session = %id, "websocket stream ended");
            true
        }
    }
}

/// Maps a socket send result into the session error space.
fn send_outcome(result: std::result::Result<(), axum::Error>, id: SessionId) -> Result<()> {
    result.map_err(|e| {
        debug!(session = %id, error = %e, "websocket send failed");
        Error::SessionClosed
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use futures_util::StreamExt;

    fn test_session() -> (
        WsSession,
        mpsc::UnboundedReceiver<SessionCommand>,
        mpsc::UnboundedSender<WsMsg>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let session = WsSession::new(
            SessionId::new(),
            cmd_tx,
            in_rx,
            Arc::new(AtomicBool::new(false)),
        );
        (session, cmd_rx, in_tx)
    }

    #[tokio::test]
    async fn test_recv_yields_inbound() {
        let (mut session, _cmd_rx, in_tx) = test_session();

        in_tx.send(WsMsg::Text("hi".into())).expect("send");
        assert_eq!(session.recv().await, Some(WsMsg::Text("hi".into())));
    }

    #[tokio::test]
    async fn test_stream_ends_when_pump_gone() {
        let (mut session, _cmd_rx, in_tx) = test_session();

        in_tx.send(WsMsg::Close(None)).expect("send");
        drop(in_tx);

        assert_eq!(session.next().await, Some(WsMsg::Close(None)));
        assert_eq!(session.next().await, None);
    }

    #[tokio::test]
    async fn test_drop_sends_single_close() {
        let (session, mut cmd_rx, _in_tx) = test_session();
        drop(session);

        match cmd_rx.recv().await {
            Some(SessionCommand::Close { code, ack, .. }) => {
                assert_eq!(code, DEFAULT_CLOSE_CODE);
                assert!(ack.is_none());
            }
            _ => panic!("expected close command"),
        }
        assert!(cmd_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_explicit_close_suppresses_drop_close() {
        let (session, mut cmd_rx, _in_tx) = test_session();

        // Acknowledge the close command so close() can resolve.
        let acker = tokio::spawn(async move {
            match cmd_rx.recv().await {
                Some(SessionCommand::Close { ack: Some(ack), .. }) => {
                    let _ = ack.send(Ok(()));
                }
                _ => panic!("expected acked close command"),
            }
            cmd_rx
        });

        session.close().await.expect("close");
        // Second close is a no-op.
        session.close().await.expect("close again");
        drop(session);

        let mut cmd_rx = acker.await.expect("join");
        assert!(cmd_rx.recv().await.is_none(), "no further close commands");
    }

    #[tokio::test]
    async fn test_send_after_pump_gone() {
        let (session, cmd_rx, _in_tx) = test_session();
        drop(cmd_rx);

        let result = session.send_text("x").await;
        assert!(matches!(result, Err(Error::SessionClosed)));
    }

    #[tokio::test]
    async fn test_send_json_serializes() {
        let (session, mut cmd_rx, _in_tx) = test_session();

        let sender = tokio::spawn(async move {
            session
                .send_json(&serde_json::json!({"got": 1}))
                .await
                .expect("send_json");
            session
        });

        match cmd_rx.recv().await {
            Some(SessionCommand::SendText { data, ack }) => {
                assert_eq!(data, r#"{"got":1}"#);
                let _ = ack.send(Ok(()));
            }
            _ => panic!("expected text command"),
        }

        let _session = sender.await.expect("join");
    }
}
