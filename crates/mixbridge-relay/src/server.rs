//! WebSocket server for control-surface clients.
//!
//! Each accepted connection is attached to the hub and served by two
//! halves: a writer task draining the client's outbox into text frames, and
//! a reader loop decoding text frames into [`ClientMessage`]s. A failure on
//! one connection only ends that connection.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use mixbridge_core::error::{Error, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::hub::HubHandle;
use crate::protocol::ClientMessage;

/// Listening WebSocket endpoint.
#[derive(Debug)]
pub struct WsServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl WsServer {
    /// Bind the listener. Use port 0 to pick any free port.
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(addr = %addr, error = %e, "Failed to bind WebSocket listener");
            Error::Io(e)
        })?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "WebSocket server listening");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept clients until `cancel` fires.
    pub async fn run(self, hub: HubHandle, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(peer = %peer, "Incoming connection");
                        let hub = hub.clone();
                        let cancel = cancel.child_token();
                        tokio::spawn(async move {
                            if let Err(e) = serve_client(stream, peer, hub, cancel).await {
                                tracing::warn!(peer = %peer, error = %e, "Client connection failed");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                    }
                },
            }
        }
        tracing::debug!("WebSocket server stopped");
    }
}

async fn serve_client(
    stream: TcpStream,
    peer: SocketAddr,
    hub: HubHandle,
    cancel: CancellationToken,
) -> Result<()> {
    let ws = accept_async(stream)
        .await
        .map_err(|e| Error::Transport(format!("WebSocket handshake failed: {e}")))?;
    let (mut write, mut read) = ws.split();

    let client = hub.attach().await?;
    let id = client.id;
    let mut outbox = client.outbox;
    tracing::info!(peer = %peer, client = id, "Client connected");

    let writer = tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to encode server message");
                    continue;
                }
            };
            if write.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = write.close().await;
    });

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = read.next() => frame,
        };

        let parsed = match frame {
            Some(Ok(Message::Text(text))) => ClientMessage::from_json(&text),
            Some(Ok(Message::Binary(data))) => ClientMessage::from_slice(&data),
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::debug!(client = id, error = %e, "WebSocket read error");
                break;
            }
        };

        match parsed {
            Ok(message) => {
                if hub.request(id, message).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(client = id, error = %e, "Dropping malformed client message");
            }
        }
    }

    // Detaching drops the hub's sender, which ends the writer.
    let _ = hub.detach(id).await;
    if cancel.is_cancelled() {
        writer.abort();
    }
    tracing::info!(peer = %peer, client = id, "Client disconnected");
    Ok(())
}
