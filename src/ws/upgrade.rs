//! Upgrade handling and the `websocket` route helper.
//!
//! [`websocket`] registers a GET route whose handler performs the
//! HTTP-to-websocket handshake, hands a [`WsSession`] to the user handler
//! on the application runtime, and closes the connection when the handler
//! is done — no matter how it finished.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Request};
use axum::response::IntoResponse;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::bridge::AppHandle;
use crate::error::Result;
use crate::identifiers::SessionId;
use crate::routing::route::{BoxHandler, MethodSpec, RouteDef};

use super::session::{self, DEFAULT_CLOSE_CODE, SessionCommand, WsMsg, WsSession};

// ============================================================================
// Route Helper
// ============================================================================

/// Builds a websocket route entry.
///
/// Always registers under GET (the upgrade handshake is a GET request) and
/// never answers HEAD. The handler receives the session and runs on the
/// application runtime; returning an error closes the connection, same as
/// returning `Ok(())`, but the error is logged.
///
/// ```ignore
/// let app = App::new().add_routes([websocket("/ws", |mut ws| async move {
///     while let Some(WsMsg::Text(text)) = ws.recv().await {
///         ws.send_text(text).await?;
///     }
///     Ok(())
/// })]);
/// ```
pub fn websocket<H, Fut>(path: impl Into<String>, handler: H) -> RouteDef
where
    H: Fn(WsSession) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let handler = Arc::new(handler);

    let wrapped: BoxHandler = Arc::new(move |request: Request, app: AppHandle| {
        let handler = Arc::clone(&handler);

        Box::pin(async move {
            let (mut parts, _body) = request.into_parts();

            match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
                Ok(upgrade) => upgrade
                    .on_upgrade(move |socket| serve_session(socket, handler, app))
                    .into_response(),
                Err(rejection) => rejection.into_response(),
            }
        })
    });

    RouteDef {
        method: MethodSpec::Only(axum::http::Method::GET),
        path: path.into(),
        handler: wrapped,
        name: None,
        allow_head: false,
    }
}

// ============================================================================
// Session Lifecycle
// ============================================================================

/// Runs one websocket session end to end.
///
/// Executes on the server loop after the handshake. Spawns the pump that
/// owns the socket, ships the session to the user handler on the
/// application runtime, and issues the final close exactly once.
async fn serve_session<H, Fut>(socket: WebSocket, handler: Arc<H>, app: AppHandle)
where
    H: Fn(WsSession) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let id = SessionId::new();
    debug!(session = %id, "websocket session established");

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<SessionCommand>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<WsMsg>();
    let closed = Arc::new(AtomicBool::new(false));

    let pump = tokio::spawn(session::pump(socket, cmd_rx, inbound_tx, id));

    let ws = WsSession::new(id, cmd_tx.clone(), inbound_rx, Arc::clone(&closed));
    let outcome = app.run(async move { handler(ws).await }).await;

    // Unconditional close. The session's Drop usually got here first via
    // the close-once flag; this path covers handlers that keep the session
    // alive on the application runtime past their own failure.
    if !closed.swap(true, Ordering::SeqCst) {
        let (ack, ack_rx) = oneshot::channel();
        if cmd_tx
            .send(SessionCommand::Close {
                code: DEFAULT_CLOSE_CODE,
                reason: String::new(),
                ack: Some(ack),
            })
            .is_ok()
        {
            let _ = ack_rx.await;
        }
    }
    drop(cmd_tx);

    match outcome {
        Ok(Ok(())) => debug!(session = %id, "websocket handler finished"),
        Ok(Err(e)) => warn!(session = %id, error = %e, "websocket handler failed"),
        Err(e) => warn!(session = %id, error = %e, "websocket handler did not complete"),
    }

    if let Err(e) = pump.await {
        warn!(session = %id, error = %e, "websocket pump aborted");
    }
}
