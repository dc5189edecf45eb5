//! BridgeBuilder -- fluent builder for a complete console-to-client bridge.
//!
//! Separates configuration from construction: set the console address,
//! local addresses and options, then [`build`](BridgeBuilder::build) binds
//! both sockets. A bind failure is returned immediately; the bridge never
//! starts without its console socket.
//!
//! # Example
//!
//! ```no_run
//! use mixbridge::BridgeBuilder;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> mixbridge::Result<()> {
//! let bridge = BridgeBuilder::new()
//!     .console("192.168.1.50:10024".parse().unwrap())
//!     .listen("0.0.0.0:8765")
//!     .build()
//!     .await?;
//!
//! let cancel = CancellationToken::new();
//! bridge.run(cancel).await;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mixbridge_console::liveness::LivenessThresholds;
use mixbridge_console::meters::MeterLayout;
use mixbridge_console::session::SessionOptions;
use mixbridge_core::error::{Error, Result};
use mixbridge_relay::hub::{HubOptions, spawn_hub};
use mixbridge_relay::server::WsServer;
use mixbridge_transport::UdpConsoleLink;
use tokio_util::sync::CancellationToken;

/// Default local bind address for the console socket.
const DEFAULT_BIND: &str = "0.0.0.0:0";

/// Default WebSocket listen address.
const DEFAULT_LISTEN: &str = "127.0.0.1:8765";

/// Fluent builder for [`Bridge`].
///
/// Only the console address is required:
///
/// ```ignore
/// let bridge = BridgeBuilder::new()
///     .console("192.168.1.50:10024".parse()?)
///     .build()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct BridgeBuilder {
    console: Option<SocketAddr>,
    bind: String,
    listen: String,
    options: HubOptions,
}

impl BridgeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        BridgeBuilder {
            console: None,
            bind: DEFAULT_BIND.to_string(),
            listen: DEFAULT_LISTEN.to_string(),
            options: HubOptions::default(),
        }
    }

    /// Set the console's UDP address.
    pub fn console(mut self, addr: SocketAddr) -> Self {
        self.console = Some(addr);
        self
    }

    /// Set the local address of the console socket (default: "0.0.0.0:0").
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind = addr.to_string();
        self
    }

    /// Set the WebSocket listen address (default: "127.0.0.1:8765").
    pub fn listen(mut self, addr: &str) -> Self {
        self.listen = addr.to_string();
        self
    }

    /// Replace all session options.
    pub fn session_options(mut self, options: SessionOptions) -> Self {
        self.options.session = options;
        self
    }

    /// Replace the liveness thresholds.
    pub fn liveness(mut self, thresholds: LivenessThresholds) -> Self {
        self.options.liveness = thresholds;
        self
    }

    /// Set the meter block to subscribe to (default: "/meters/1").
    pub fn meter_block(mut self, block: &str) -> Self {
        self.options.session.meter_block = block.to_string();
        self
    }

    /// Set the meter strip layout.
    pub fn meter_layout(mut self, layout: MeterLayout) -> Self {
        self.options.session.meter_layout = layout;
        self
    }

    /// Set the keep-alive period (default: 8 s).
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.options.session.keepalive_interval = interval;
        self
    }

    /// Set how many messages may queue per client (default: 256).
    pub fn client_buffer(mut self, capacity: usize) -> Self {
        self.options.client_buffer = capacity;
        self
    }

    /// Bind the console socket and the WebSocket listener.
    pub async fn build(self) -> Result<Bridge> {
        let console = self
            .console
            .ok_or_else(|| Error::Config("console address not set".into()))?;

        let link = UdpConsoleLink::bind(&self.bind, console).await?;
        let server = WsServer::bind(&self.listen).await?;

        Ok(Bridge {
            link: Arc::new(link),
            server,
            options: self.options,
        })
    }
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound, ready-to-run bridge.
#[derive(Debug)]
pub struct Bridge {
    link: Arc<UdpConsoleLink>,
    server: WsServer,
    options: HubOptions,
}

impl Bridge {
    /// Local address of the console socket.
    pub fn console_local_addr(&self) -> SocketAddr {
        self.link.local_addr()
    }

    /// Address clients connect to.
    pub fn listen_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Run the hub and the WebSocket server until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            console = %self.link.console_addr(),
            local = %self.link.local_addr(),
            listen = %self.server.local_addr(),
            "Bridge running"
        );

        let (hub, hub_task) = spawn_hub(self.link, self.options, cancel.clone());
        self.server.run(hub, cancel).await;
        let _ = hub_task.await;

        tracing::info!("Bridge stopped");
    }
}
