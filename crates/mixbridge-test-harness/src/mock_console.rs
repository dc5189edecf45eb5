//! Scripted UDP console for network-level testing.
//!
//! [`MockConsole`] binds a UDP socket on localhost and plays the console's
//! side of the conversation: it receives whatever the bridge sends and
//! replies to the last peer it heard from. Tests drive it step by step,
//! usually waiting for a specific query with
//! [`recv_matching`](MockConsole::recv_matching) and answering with
//! [`reply`](MockConsole::reply).

use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use mixbridge_core::error::{Error, Result};
use tokio::net::UdpSocket;

/// A scripted console reachable over UDP on localhost.
#[derive(Debug)]
pub struct MockConsole {
    socket: UdpSocket,
    addr: SocketAddr,
    /// Source of the most recently received datagram.
    peer: Mutex<Option<SocketAddr>>,
}

impl MockConsole {
    /// Bind a mock console on a random localhost port.
    pub async fn bind() -> Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock console: {}", e)))?;
        let addr = socket.local_addr().map_err(Error::Io)?;
        tracing::debug!(addr = %addr, "Mock console listening");
        Ok(Self {
            socket,
            addr,
            peer: Mutex::new(None),
        })
    }

    /// Address the bridge should target.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Source address of the last datagram received, if any.
    pub fn peer(&self) -> Option<SocketAddr> {
        *self.peer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Receive the next datagram, or [`Error::Timeout`].
    pub async fn recv(&self, timeout: Duration) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; 4096];
        let (n, src) = tokio::time::timeout(timeout, self.socket.recv_from(&mut buf))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(Error::Io)?;
        *self.peer.lock().unwrap_or_else(|e| e.into_inner()) = Some(src);
        buf.truncate(n);
        Ok(buf)
    }

    /// Receive datagrams until one satisfies `pred`, discarding the rest.
    ///
    /// The timeout bounds the whole wait, not each datagram.
    pub async fn recv_matching(
        &self,
        timeout: Duration,
        pred: impl Fn(&[u8]) -> bool,
    ) -> Result<Vec<u8>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let datagram = self.recv(remaining).await?;
            if pred(&datagram) {
                return Ok(datagram);
            }
        }
    }

    /// Send a datagram to the last peer.
    ///
    /// Fails with [`Error::NotConnected`] until something has been received.
    pub async fn reply(&self, datagram: &[u8]) -> Result<()> {
        let peer = self.peer().ok_or(Error::NotConnected)?;
        self.socket
            .send_to(datagram, peer)
            .await
            .map_err(Error::Io)?;
        Ok(())
    }
}
