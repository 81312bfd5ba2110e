use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use bridge_server::{backend, BridgeServer, BrokerBackend, ServerConfig};
use broker_gateway::BrokerGateway;
use clap::Parser;
use tracing::{error, info, warn};

/// Drone bridge
///
/// Serves WebSocket sessions that subscribe to device telemetry and
/// signaling on a topic exchange and publish commands back to devices.
#[derive(Parser, Debug)]
#[command(name = "drone-bridge")]
#[command(about = "WebSocket to topic exchange bridge for drone telemetry and signaling")]
#[command(version)]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "DRONE_BRIDGE_LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// AMQP broker URL; the in-process broker is used when absent
    #[arg(long, env = "DRONE_BRIDGE_BROKER_URL")]
    pub broker_url: Option<String>,

    /// Name of the shared topic exchange
    #[arg(long, env = "DRONE_BRIDGE_EXCHANGE", default_value = "drone")]
    pub exchange: String,

    /// Name of the queue shared by admin sessions
    #[arg(long, env = "DRONE_BRIDGE_ADMIN_QUEUE", default_value = "admin-drone")]
    pub admin_queue: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl From<&Args> for ServerConfig {
    fn from(args: &Args) -> Self {
        let broker = match &args.broker_url {
            Some(url) => BrokerBackend::Amqp { url: url.clone() },
            None => BrokerBackend::Memory,
        };
        ServerConfig::new()
            .with_listen_addr(args.listen)
            .with_broker(broker)
            .with_exchange(args.exchange.clone())
            .with_admin_queue(args.admin_queue.clone())
    }
}

/// Initialize tracing; `RUST_LOG` overrides the default `info` filter.
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = ServerConfig::from(&args);
    config.validate().context("Invalid configuration")?;

    let broker = backend::connect(&config.broker)
        .await
        .inspect_err(|e| error!(error = %e, "Failed to set up broker backend"))
        .context("Failed to set up broker backend")?;
    let gateway = Arc::new(BrokerGateway::new(broker, config.gateway.clone()));

    // Sessions assert the exchange again on demand
    if let Err(e) = gateway.ensure_exchange().await {
        warn!(error = %e, "Exchange not asserted at startup");
    }

    let server = BridgeServer::start(&config, gateway)
        .await
        .context("Failed to start server")?;
    info!(
        addr = %server.local_addr(),
        exchange = %config.gateway.exchange_name,
        "drone-bridge ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");
    server.shutdown().await;

    Ok(())
}
