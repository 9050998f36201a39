//! Conflux gateway server
//!
//! Standalone entry point: serves the client-facing transport over an
//! (initially empty) downstream registry. The embedding lifecycle
//! manager registers servers and publishes events against the registry
//! at runtime.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use conflux::downstream::ServerRegistry;
use conflux::{Gateway, GatewayConfig};

#[derive(Parser, Debug)]
#[command(name = "conflux-server", version)]
#[command(about = "MCP gateway aggregating many servers behind one endpoint")]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1", env = "CONFLUX_HOST")]
    host: IpAddr,

    /// Port to listen on
    #[arg(long, default_value_t = 37373, env = "CONFLUX_PORT")]
    port: u16,

    /// Downstream call timeout in seconds
    #[arg(long, default_value_t = 300, env = "CONFLUX_TIMEOUT_SECS")]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = GatewayConfig {
        addr: SocketAddr::new(args.host, args.port),
        call_timeout: Duration::from_secs(args.timeout_secs),
        ..GatewayConfig::default()
    };

    let registry = Arc::new(ServerRegistry::new(config.event_capacity));

    tracing::info!(
        addr = %config.addr,
        version = conflux::VERSION,
        "starting conflux gateway"
    );

    let gateway = Gateway::new(registry, config);
    gateway.serve().await?;

    Ok(())
}
