//! In-memory console link for deterministic testing.
//!
//! [`MockLink`] implements [`ConsoleLink`] without a socket. Every sent
//! datagram is recorded for later inspection, and tests feed console replies
//! in with [`inject`](MockLink::inject).
//!
//! # Example
//!
//! ```
//! use mixbridge_core::ConsoleLink;
//! use mixbridge_test_harness::MockLink;
//!
//! # async fn example() -> mixbridge_core::Result<()> {
//! let link = MockLink::new();
//! link.send(b"/xremote\0\0\0\0,\0\0\0").await?;
//! assert_eq!(link.sent().len(), 1);
//!
//! link.inject(b"/info\0\0\0,\0\0\0".to_vec());
//! let mut buf = [0u8; 64];
//! let n = link.recv(&mut buf).await?;
//! assert_eq!(n, 12);
//! # Ok(())
//! # }
//! ```

use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use mixbridge_core::error::{Error, Result};
use mixbridge_core::transport::ConsoleLink;
use tokio::sync::mpsc;

/// A mock [`ConsoleLink`] backed by an in-memory queue.
#[derive(Debug)]
pub struct MockLink {
    /// Log of all datagrams sent through this link.
    sent_log: Mutex<Vec<Vec<u8>>>,
    inbound_tx: mpsc::UnboundedSender<io::Result<Vec<u8>>>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<io::Result<Vec<u8>>>>,
    /// When set, `send()` fails without recording.
    fail_sends: AtomicBool,
}

impl MockLink {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        MockLink {
            sent_log: Mutex::new(Vec::new()),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            fail_sends: AtomicBool::new(false),
        }
    }

    /// Queue a datagram to be returned by the next `recv()`.
    pub fn inject(&self, datagram: Vec<u8>) {
        let _ = self.inbound_tx.send(Ok(datagram));
    }

    /// Queue a socket error to be returned by `recv()` in order with
    /// injected datagrams.
    pub fn inject_recv_error(&self, kind: io::ErrorKind) {
        let _ = self
            .inbound_tx
            .send(Err(io::Error::new(kind, "mock receive failure")));
    }

    /// Copy of every datagram sent so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.log().clone()
    }

    /// Drain and return every datagram sent so far.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.log())
    }

    /// Make subsequent sends fail with [`Error::Transport`].
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    fn log(&self) -> std::sync::MutexGuard<'_, Vec<Vec<u8>>> {
        self.sent_log.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConsoleLink for MockLink {
    async fn send(&self, datagram: &[u8]) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::Transport("mock send failure".into()));
        }
        self.log().push(datagram.to_vec());
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let datagram = self
            .inbound_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(Error::ConnectionLost)??;

        // Truncate like a real datagram socket.
        let n = datagram.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram[..n]);
        Ok(n)
    }
}
