//! Transport implementations for mixbridge.
//!
//! This crate provides the console-facing datagram socket:
//!
//! - [`UdpTransport`]: a thin, logged wrapper over a tokio UDP socket
//! - [`UdpConsoleLink`]: a [`ConsoleLink`](mixbridge_core::ConsoleLink) bound
//!   to a single console address, used for all send and receive traffic
//!
//! # Example
//!
//! ```no_run
//! use mixbridge_core::ConsoleLink;
//! use mixbridge_transport::UdpConsoleLink;
//!
//! # async fn example() -> mixbridge_core::Result<()> {
//! let console = "192.168.1.50:10024".parse().unwrap();
//! let link = UdpConsoleLink::bind("0.0.0.0:0", console).await?;
//!
//! // Keep-alive query: address only, no arguments.
//! link.send(b"/xremote\0\0\0\0,\0\0\0").await?;
//!
//! let mut buf = [0u8; 4096];
//! let n = link.recv(&mut buf).await?;
//! # Ok(())
//! # }
//! ```

pub mod udp;

pub use udp::{UdpConsoleLink, UdpTransport};
