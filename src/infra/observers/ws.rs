//! WebSocket observer transport (feature `ws`).
//!
//! Every accepted connection is registered on the [`ObserverHub`], greeted
//! with the counter snapshots and then fed from its channel until either side
//! closes. Inbound frames are read only to notice the close.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::core::{EventBroadcaster, WorkerError};
use crate::infra::observers::ObserverHub;

/// Accept WebSocket observers on `listener` until `cancel` fires.
///
/// # Errors
///
/// Returns `WorkerError::Channel` if the listener fails to accept.
pub async fn serve_websocket(
    listener: TcpListener,
    broadcaster: Arc<EventBroadcaster<ObserverHub>>,
    cancel: CancellationToken,
) -> Result<(), WorkerError> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "websocket observers listening");
    }
    loop {
        let (stream, peer) = tokio::select! {
            () = cancel.cancelled() => break,
            accepted = listener.accept() => {
                accepted.map_err(|e| WorkerError::Channel(format!("accept failed: {e}")))?
            }
        };
        let broadcaster = Arc::clone(&broadcaster);
        let cancel = cancel.child_token();
        tokio::spawn(async move {
            serve_observer(stream, peer, broadcaster, cancel).await;
        });
    }
    tracing::info!("websocket listener stopped");
    Ok(())
}

async fn serve_observer(
    stream: TcpStream,
    peer: SocketAddr,
    broadcaster: Arc<EventBroadcaster<ObserverHub>>,
    cancel: CancellationToken,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(%peer, error = %e, "websocket handshake failed");
            return;
        }
    };
    let (mut write, mut read) = ws.split();
    let hub = broadcaster.channel();
    let (observer, mut outbox) = hub.register();
    tracing::info!(%peer, observer, "observer connected");
    broadcaster.greet(observer).await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            outgoing = outbox.recv() => {
                let Some(text) = outgoing else { break };
                if let Err(e) = write.send(Message::text(text)).await {
                    tracing::debug!(observer, error = %e, "observer write failed");
                    break;
                }
            }
            incoming = read.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(observer, error = %e, "observer read failed");
                    break;
                }
            },
        }
    }

    hub.unregister(observer);
    tracing::info!(%peer, observer, "observer disconnected");
}
