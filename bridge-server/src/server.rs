//! HTTP server exposing the session WebSocket endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use broker_gateway::BrokerGateway;
use tokio::sync::mpsc;
use warp::Filter;

use crate::config::ServerConfig;
use crate::connection::{self, AppContext};
use crate::error::{Result, ServerError};

/// How long shutdown waits for live sessions to release their consumers.
const SESSION_CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Route table: `GET /health` and the `GET /ws` upgrade.
pub fn routes(
    ctx: AppContext,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| "OK");

    let ws = warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_context(ctx))
        .map(|ws: warp::ws::Ws, ctx: AppContext| {
            ws.on_upgrade(move |socket| connection::serve(socket, ctx))
        });

    health.or(ws)
}

fn with_context(
    ctx: AppContext,
) -> impl Filter<Extract = (AppContext,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

/// The running WebSocket server.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use broker_gateway::{BrokerGateway, GatewayConfig, MemoryBroker};
/// use bridge_server::{BridgeServer, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> bridge_server::Result<()> {
///     let config = ServerConfig::default();
///     let gateway = Arc::new(BrokerGateway::new(
///         Arc::new(MemoryBroker::new()),
///         config.gateway.clone(),
///     ));
///
///     let server = BridgeServer::start(&config, gateway).await?;
///     println!("Listening on {}", server.local_addr());
///     server.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct BridgeServer {
    /// The address the server is bound to
    local_addr: SocketAddr,
    /// Context shared with every connection
    ctx: AppContext,
    /// Shutdown signal sender
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl BridgeServer {
    /// Bind the listener and start serving sessions.
    ///
    /// # Arguments
    ///
    /// * `config` - Listen address and per-session settings
    /// * `gateway` - The gateway every session shares
    pub async fn start(config: &ServerConfig, gateway: Arc<BrokerGateway>) -> Result<Self> {
        let ctx = AppContext::new(gateway, config.stream.clone());
        let routes = routes(ctx.clone()).recover(handle_rejection);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let (local_addr, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(config.listen_addr, async move {
                shutdown_rx.recv().await;
            })
            .map_err(|e| ServerError::Bind(format!("{}: {e}", config.listen_addr)))?;

        tracing::info!(addr = %local_addr, "Bridge server listening");
        let server_handle = tokio::spawn(server);

        Ok(Self {
            local_addr,
            ctx,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of WebSocket sessions currently being served.
    pub fn live_sessions(&self) -> usize {
        self.ctx.live_sessions()
    }

    /// Stop accepting connections, then close every live session.
    ///
    /// Upgraded connections outlive the accept loop, so each one is told to
    /// close and release its consumers before this returns.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }

        if let Some(handle) = self.server_handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Server task ended abnormally");
            }
        }
        self.ctx.close_sessions(SESSION_CLOSE_GRACE).await;
        tracing::info!("Bridge server stopped");
    }
}

/// Handle rejections and convert them to HTTP responses.
async fn handle_rejection(
    err: warp::Rejection,
) -> std::result::Result<impl warp::Reply, std::convert::Infallible> {
    let code;
    let message;

    if err.is_not_found() {
        code = warp::http::StatusCode::NOT_FOUND;
        message = "Not found";
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        code = warp::http::StatusCode::METHOD_NOT_ALLOWED;
        message = "Method not allowed";
    } else {
        code = warp::http::StatusCode::BAD_REQUEST;
        message = "Bad request";
    }

    Ok(warp::reply::with_status(message, code))
}
