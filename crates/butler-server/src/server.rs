//! [`RelayServer`] – binds the HTTP listener and serves the relay routes.
//!
//! Listens on `0.0.0.0:8000` (configurable via [`RelayServer::with_port`]).

use std::future::Future;
use std::net::SocketAddr;

use butler_types::ButlerError;
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::{AppState, router};

/// Default TCP port for the relay.
pub const DEFAULT_PORT: u16 = 8000;

/// HTTP front door for uploads and planning polls.
///
/// # Example
///
/// ```rust,no_run
/// # async fn run(state: butler_server::AppState) {
/// use butler_server::RelayServer;
///
/// RelayServer::new(state)
///     .with_port(8000)
///     .run_until(async {
///         let _ = tokio::signal::ctrl_c().await;
///     })
///     .await
///     .expect("relay server failed");
/// # }
/// ```
pub struct RelayServer {
    state: AppState,
    port: u16,
}

impl RelayServer {
    /// Create a server for `state` on the [`DEFAULT_PORT`].
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            port: DEFAULT_PORT,
        }
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns [`ButlerError::Transport`] if the listener cannot bind or the
    /// server loop fails.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ButlerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ButlerError::Transport(format!("bind error on {addr}: {e}")))?;

        info!(%addr, "relay listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ButlerError::Transport(format!("server error: {e}")))?;

        info!("relay stopped");
        Ok(())
    }
}
