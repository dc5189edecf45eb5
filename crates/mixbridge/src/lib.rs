//! # mixbridge -- Real-Time Mixing Console Bridge
//!
//! `mixbridge` connects a digital mixing console, reachable only over its
//! binary UDP control protocol, to any number of remote control surfaces
//! speaking JSON over WebSocket. It keeps a remote session with the console
//! alive, decodes status and metering frames, classifies session health as
//! OFFLINE / STALE / LIVE, and refuses control writes from clients unless
//! the session is demonstrably LIVE.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mixbridge::BridgeBuilder;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> mixbridge::Result<()> {
//!     let bridge = BridgeBuilder::new()
//!         .console("192.168.1.50:10024".parse().unwrap())
//!         .listen("0.0.0.0:8765")
//!         .build()
//!         .await?;
//!
//!     let cancel = CancellationToken::new();
//!     let stop = cancel.clone();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         stop.cancel();
//!     });
//!     bridge.run(cancel).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! | Crate                     | Purpose                                              |
//! |---------------------------|------------------------------------------------------|
//! | `mixbridge-core`          | Types, events, the [`ConsoleLink`] trait, errors     |
//! | `mixbridge-transport`     | UDP console link                                     |
//! | `mixbridge-console`       | Wire codec, meters, registry, liveness, session      |
//! | `mixbridge-relay`         | Client protocol, gating hub, WebSocket server        |
//! | **`mixbridge`**           | This facade crate -- re-exports and [`BridgeBuilder`] |
//!
//! ## Client Protocol
//!
//! Clients send `hello`, `requestFullState`, `registerTarget`, `setFader`,
//! `setMute`, `setBusAssignment` and `toggleChannelMute`. The bridge sends
//! `welcome`, partial `returnState` / `channelState` / `busNames` updates,
//! `connectionState` on every liveness change, and `error` with code
//! `SAFE_STATE_BLOCK` when a control write arrives while not LIVE. See
//! [`relay::protocol`] for the exact shapes.

pub mod builder;

pub use builder::{Bridge, BridgeBuilder};
pub use mixbridge_core::*;

/// Console-facing protocol engine: codec, meters, registry, liveness and
/// session.
pub mod console {
    pub use mixbridge_console::*;
}

/// Client-facing relay: protocol types, hub and WebSocket server.
pub mod relay {
    pub use mixbridge_relay::*;
}

/// Console transports.
pub mod transport {
    pub use mixbridge_transport::*;
}
