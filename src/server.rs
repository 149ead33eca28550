//! Server initialization and routing
//!
//! This module wires both halves of the process together:
//! - the Axum router for the read-only web front end
//! - the publish endpoint, sharing the same work directory handle
//! - a single shutdown token so both servers stop together

use crate::config::ServerConfig;
use crate::middleware::{log_requests, request_id};
use crate::publish::{DiskPublisher, PublishServer};
use crate::routes::{assets, not_found, pages, projects};
use crate::state::ServerState;
use anyhow::Context;
use axum::Router;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the Axum router with all routes and middleware
///
/// Middleware stack (applied in reverse order):
/// 1. Tracing spans
/// 2. Request ID tracking
/// 3. Request logging
/// 4. Timeout handling
pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(pages::index_page))
        .route("/api/get_projects", get(projects::get_projects))
        .route("/static/{*path}", get(assets::serve_static))
        .route("/projects/{*path}", get(projects::serve_project_file))
        .fallback(not_found)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.timeout(),
        ))
        .layer(from_fn(log_requests))
        .layer(from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Install the JSON log subscriber. Later calls are no-ops.
pub fn init_tracing(config: &ServerConfig) {
    // Fails only when a subscriber is already installed (tests, embedders).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .json()
        .try_init();
}

/// Both servers bound and ready to run.
pub struct Servers {
    state: Arc<ServerState>,
    http: tokio::net::TcpListener,
    publish: PublishServer,
}

impl Servers {
    /// Open the work directory and bind both listening sockets.
    pub async fn bind(config: ServerConfig) -> anyhow::Result<Self> {
        let http_addr = config.socket_addr()?;
        let publish_addr = config.publish_socket_addr()?;
        let idle_timeout = config.publish_idle_timeout();
        let max_message_bytes = config.max_message_bytes();

        let state = Arc::new(ServerState::new(config)?);

        let http = tokio::net::TcpListener::bind(http_addr)
            .await
            .with_context(|| format!("failed to bind web server on {http_addr}"))?;

        let publisher = Arc::new(DiskPublisher::new(state.work_dir.clone()));
        let publish = PublishServer::bind(publish_addr, publisher)
            .await
            .with_context(|| format!("failed to bind publish endpoint on {publish_addr}"))?
            .with_idle_timeout(idle_timeout)
            .with_max_message_bytes(max_message_bytes);

        Ok(Self {
            state,
            http,
            publish,
        })
    }

    pub fn http_addr(&self) -> std::io::Result<SocketAddr> {
        self.http.local_addr()
    }

    pub fn publish_addr(&self) -> std::io::Result<SocketAddr> {
        self.publish.local_addr()
    }

    /// Run until `shutdown` is cancelled. If either server fails the other
    /// is shut down as well.
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        tracing::info!(
            http = %self.http_addr()?,
            publish = %self.publish_addr()?,
            work_dir = %self.state.work_dir.root().display(),
            "Starting documentation server"
        );
        tracing::info!(
            "Timeout: {}s, Publish idle timeout: {}s, Max publish message: {}MB",
            self.state.config.timeout_secs,
            self.state.config.publish_idle_timeout_secs,
            self.state.config.max_message_mb
        );

        let Servers {
            state,
            http,
            publish,
        } = self;
        let app = build_router(state);

        let http = {
            let shutdown = shutdown.clone();
            async move {
                let result = axum::serve(http, app)
                    .with_graceful_shutdown(shutdown.clone().cancelled_owned())
                    .await;
                shutdown.cancel();
                result
            }
        };
        let publish = {
            let shutdown = shutdown.clone();
            async move {
                let result = publish.run(shutdown.clone()).await;
                shutdown.cancel();
                result
            }
        };

        let (http_result, publish_result) = tokio::join!(http, publish);
        http_result.context("web server failed")?;
        publish_result.context("publish endpoint failed")?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Start the web front end and the publish endpoint
///
/// Blocks until SIGTERM or Ctrl+C, then stops both servers.
///
/// # Example
///
/// ```rust,no_run
/// use porfavor::{ConfigOverrides, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = ServerConfig::load(ConfigOverrides::default())?;
///     porfavor::start_server(config).await?;
///     Ok(())
/// }
/// ```
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    init_tracing(&config);

    let servers = Servers::bind(config).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    servers.run(shutdown).await
}

/// Shutdown signal handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
