//! Console link trait.
//!
//! The [`ConsoleLink`] trait abstracts over the single datagram socket shared
//! by all console traffic. The session manager and the relay hub operate on a
//! `ConsoleLink` rather than directly on a UDP socket, enabling both real
//! console control and deterministic unit testing with `MockLink` from the
//! `mixbridge-test-harness` crate.

use async_trait::async_trait;

use crate::error::Result;

/// Asynchronous datagram link to a console.
///
/// Sending and receiving share one underlying socket: the console only
/// forwards subscribed telemetry to the port that subscribed. Both methods
/// take `&self` so a pending receive never blocks a send.
#[async_trait]
pub trait ConsoleLink: Send + Sync {
    /// Send one datagram to the console.
    ///
    /// Datagram transports are fire-and-forget; `Ok` means the datagram was
    /// handed to the OS, not that the console received it.
    async fn send(&self, datagram: &[u8]) -> Result<()>;

    /// Wait for the next datagram from the console.
    ///
    /// Returns the number of bytes written into `buf`. Datagrams from other
    /// peers are discarded by the implementation.
    ///
    /// Must be cancel-safe: dropping the future before it completes must not
    /// lose a datagram that has not been returned yet.
    async fn recv(&self, buf: &mut [u8]) -> Result<usize>;
}
