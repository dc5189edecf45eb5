//! UDP transport for console communication.
//!
//! [`UdpTransport`] wraps a [`tokio::net::UdpSocket`] with error mapping and
//! tracing consistent with the rest of the bridge. [`UdpConsoleLink`] pins a
//! transport to one console address and implements
//! [`ConsoleLink`](mixbridge_core::ConsoleLink).
//!
//! The console only forwards subscribed meter frames to the port that sent
//! the subscription, so a single socket carries every send and receive.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use mixbridge_core::error::{Error, Result};
use mixbridge_core::transport::ConsoleLink;
use tokio::net::UdpSocket;

/// UDP transport for datagram-based console communication.
#[derive(Debug)]
pub struct UdpTransport {
    /// The underlying UDP socket.
    socket: UdpSocket,
    /// The local address the socket is bound to.
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind to a local address.
    ///
    /// Use `"0.0.0.0:0"` to bind to any available port on all interfaces.
    /// A bind failure is returned as an error; the bridge cannot run without
    /// its console socket.
    pub async fn bind(addr: &str) -> Result<Self> {
        tracing::debug!(addr = %addr, "Binding UDP socket");

        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            tracing::error!(addr = %addr, error = %e, "Failed to bind UDP socket");
            Error::Io(e)
        })?;

        let local_addr = socket.local_addr().map_err(|e| {
            tracing::error!(error = %e, "Failed to get local address");
            Error::Io(e)
        })?;

        tracing::debug!(local_addr = %local_addr, "UDP socket bound");

        Ok(Self { socket, local_addr })
    }

    /// Get the local address this socket is bound to.
    ///
    /// This is useful when binding to port 0 to discover the assigned port.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send a datagram to the specified address.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> Result<()> {
        tracing::trace!(
            local = %self.local_addr,
            remote = %addr,
            bytes = data.len(),
            "Sending datagram"
        );

        self.socket.send_to(data, addr).await.map_err(|e| {
            tracing::warn!(
                local = %self.local_addr,
                remote = %addr,
                error = %e,
                "Failed to send datagram"
            );
            Error::Io(e)
        })?;

        Ok(())
    }

    /// Receive a datagram. Returns `(bytes_read, source_addr)`.
    ///
    /// Any bytes beyond `buf.len()` are silently discarded (standard UDP
    /// behavior). With `Some(timeout)`, returns [`Error::Timeout`] if no
    /// datagram arrives in time; with `None`, waits indefinitely.
    ///
    /// Cancel-safe: dropping the future never loses a datagram.
    pub async fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<(usize, SocketAddr)> {
        let result = match timeout {
            Some(t) => tokio::time::timeout(t, self.socket.recv_from(buf))
                .await
                .map_err(|_| Error::Timeout)?,
            None => self.socket.recv_from(buf).await,
        };

        match result {
            Ok((n, src)) => {
                tracing::trace!(
                    local = %self.local_addr,
                    remote = %src,
                    bytes = n,
                    "Received datagram"
                );
                Ok((n, src))
            }
            Err(e) => {
                tracing::debug!(
                    local = %self.local_addr,
                    error = %e,
                    "Failed to receive datagram"
                );
                Err(Error::Io(e))
            }
        }
    }
}

/// A [`ConsoleLink`] over UDP, bound to a single console address.
///
/// Datagrams from any other source are dropped on receive.
#[derive(Debug)]
pub struct UdpConsoleLink {
    transport: UdpTransport,
    console: SocketAddr,
}

impl UdpConsoleLink {
    /// Bind a local socket and target the given console.
    pub async fn bind(local: &str, console: SocketAddr) -> Result<Self> {
        let transport = UdpTransport::bind(local).await?;
        tracing::info!(
            local = %transport.local_addr(),
            console = %console,
            "Console link ready"
        );
        Ok(Self { transport, console })
    }

    /// Address of the console this link talks to.
    pub fn console_addr(&self) -> SocketAddr {
        self.console
    }

    /// Local address of the shared console socket.
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }
}

#[async_trait]
impl ConsoleLink for UdpConsoleLink {
    async fn send(&self, datagram: &[u8]) -> Result<()> {
        self.transport.send_to(datagram, self.console).await
    }

    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let (n, src) = self.transport.recv_from(buf, None).await?;
            if src == self.console {
                return Ok(n);
            }
            tracing::trace!(
                source = %src,
                console = %self.console,
                "Dropping datagram from unexpected source"
            );
        }
    }
}
