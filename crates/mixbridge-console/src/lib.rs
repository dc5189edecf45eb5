//! Console-facing protocol engine for mixbridge.
//!
//! This crate speaks the console's binary UDP control protocol. It provides:
//!
//! - **Wire codec** ([`codec`]) -- encode and defensively decode address +
//!   type-tag + argument messages.
//! - **Meters** ([`meters`]) -- bounds-checked meter blob decoding, dB to
//!   display-level mapping, signal-present detection, strip layout.
//! - **Commands** ([`commands`]) -- console address construction and
//!   routing of decoded messages to typed reports. The only place where mute
//!   polarity is converted.
//! - **Registry** ([`registry`]) -- cached return, channel and bus-name
//!   state producing partial-update patches.
//! - **Liveness** ([`liveness`]) -- OFFLINE / STALE / LIVE classification
//!   and one-shot recovery bookkeeping.
//! - **Session** ([`session`]) -- the [`ConsoleSession`] tying the above to
//!   a [`ConsoleLink`](mixbridge_core::ConsoleLink).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Instant;
//! use mixbridge_console::{ConsoleSession, LivenessThresholds, SessionOptions};
//! use mixbridge_transport::UdpConsoleLink;
//!
//! # async fn example() -> mixbridge_core::Result<()> {
//! let link = UdpConsoleLink::bind("0.0.0.0:0", "192.168.1.50:10024".parse().unwrap()).await?;
//! let mut session = ConsoleSession::new(
//!     Arc::new(link),
//!     SessionOptions::default(),
//!     LivenessThresholds::default(),
//! );
//! session.start().await?;
//! session.register_channel(5).await?;
//! let _ = session.evaluate_liveness(Instant::now());
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod commands;
pub mod liveness;
pub mod meters;
pub mod registry;
pub mod session;

pub use codec::{Arg, WireMessage};
pub use liveness::{LivenessMonitor, LivenessThresholds, Transition};
pub use meters::{MeterFrame, MeterLayout};
pub use registry::Registry;
pub use session::{ConsoleSession, SessionOptions};
