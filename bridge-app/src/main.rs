// mixbridge -- bridge a mixing console's UDP control protocol to WebSocket
// control surfaces.
//
// Usage:
//   mixbridge --console 192.168.1.50:10024
//   mixbridge --console 10.0.0.20:10024 --listen 0.0.0.0:8765 --log-level debug
//   RUST_LOG=mixbridge_relay=trace mixbridge --console 10.0.0.20:10024

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use mixbridge::BridgeBuilder;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Bridge a mixing console to WebSocket control surfaces.
#[derive(Parser, Debug)]
#[command(name = "mixbridge", version, about)]
struct Cli {
    /// Console UDP address.
    #[arg(long, default_value = "192.168.1.50:10024")]
    console: SocketAddr,

    /// Local address of the console socket.
    #[arg(long, default_value = "0.0.0.0:0")]
    bind: String,

    /// WebSocket listen address for clients.
    #[arg(long, default_value = "127.0.0.1:8765")]
    listen: String,

    /// Meter block to subscribe to.
    #[arg(long, default_value = "/meters/1")]
    meter_block: String,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_tracing(fallback: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let bridge = BridgeBuilder::new()
        .console(cli.console)
        .bind(&cli.bind)
        .listen(&cli.listen)
        .meter_block(&cli.meter_block)
        .build()
        .await
        .with_context(|| format!("failed to start bridge for console {}", cli.console))?;

    println!("mixbridge: console {} <-> ws://{}", cli.console, bridge.listen_addr());

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, shutting down");
        }
        stop.cancel();
    });

    bridge.run(cancel).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["mixbridge"]);
        assert_eq!(cli.console, "192.168.1.50:10024".parse().unwrap());
        assert_eq!(cli.bind, "0.0.0.0:0");
        assert_eq!(cli.listen, "127.0.0.1:8765");
        assert_eq!(cli.meter_block, "/meters/1");
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn overrides() {
        let cli = Cli::parse_from([
            "mixbridge",
            "--console",
            "10.0.0.20:10024",
            "--listen",
            "0.0.0.0:9000",
            "--meter-block",
            "/meters/2",
        ]);
        assert_eq!(cli.console.port(), 10024);
        assert_eq!(cli.listen, "0.0.0.0:9000");
        assert_eq!(cli.meter_block, "/meters/2");
    }

    #[test]
    fn rejects_bad_console_address() {
        assert!(Cli::try_parse_from(["mixbridge", "--console", "nowhere"]).is_err());
    }
}
