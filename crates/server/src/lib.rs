//! Inbound HTTP surface of the pooler: planting notifications from the
//! Backend plus the health and work-status probes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use pooler_core::{Coordinator, MonitorStats};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

mod handlers;

use handlers::AppState;

pub(crate) const LOG_TARGET: &str = "server";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("pooler server has already been stopped")]
    AlreadyStopped,
}

/// Handle to a started pooler server.
///
/// Shutdown rides the same primitives as the rest of the pooler: a
/// [`CancellationToken`] feeds axum's graceful shutdown, and a
/// [`TaskTracker`] holding the single serve task answers whether the
/// server has fully wound down.
#[derive(Debug, Clone)]
pub struct PoolerServerHandle {
    /// The actual address the server is bound to.
    addr: SocketAddr,
    stop: CancellationToken,
    serve_tasks: TaskTracker,
}

impl PoolerServerHandle {
    /// Tell the server to stop without waiting for it.
    pub fn stop(&self) -> Result<(), Error> {
        if self.stop.is_cancelled() {
            return Err(Error::AlreadyStopped);
        }
        self.stop.cancel();
        Ok(())
    }

    /// Resolves when the server has fully stopped.
    pub async fn stopped(self) {
        self.serve_tasks.wait().await
    }

    pub fn is_stopped(&self) -> bool {
        self.serve_tasks.is_empty()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// The inbound HTTP server.
pub struct PoolerServer {
    state: AppState,
    timeout: Duration,
}

impl PoolerServer {
    pub fn new(
        coordinator: Coordinator,
        stats: Arc<MonitorStats>,
        auth_token: String,
        max_error_count: u32,
    ) -> Self {
        Self {
            state: AppState { coordinator, stats, auth_token, max_error_count },
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set the per-request timeout. Default is 30 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bind and start serving; requests stop being accepted once the
    /// returned handle's `stop` is called.
    pub async fn start(&self, addr: SocketAddr) -> Result<PoolerServerHandle, Error> {
        let listener = TcpListener::bind(addr).await?;

        let app = self.create_app();
        let actual_addr = listener.local_addr()?;

        let stop = CancellationToken::new();
        let serve_tasks = TaskTracker::new();

        let shutdown = stop.clone();
        serve_tasks.spawn(async move {
            let server = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await });

            if let Err(err) = server.await {
                error!(target: LOG_TARGET, error = ?err, "Pooler server error.");
            }
        });
        // the serve task is the only occupant, so `wait` tracks it alone
        serve_tasks.close();

        info!(target: LOG_TARGET, addr = %actual_addr, "Pooler server started.");

        Ok(PoolerServerHandle { addr: actual_addr, stop, serve_tasks })
    }

    fn create_app(&self) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(self.timeout));

        Router::new()
            .route("/backend/planting-status", post(handlers::planting_status))
            .route("/backend/planted-farmers", post(handlers::planted_farmers))
            .route("/health", get(handlers::health))
            .route("/status/work", get(handlers::work_status))
            .layer(middleware)
            .with_state(self.state.clone())
    }
}
