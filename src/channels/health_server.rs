//! Liveness HTTP server.
//!
//! Serves `GET /` with a fixed liveness string and `GET /status` with the
//! report of the most recent ledger tick. Extra route fragments can be merged
//! in before `start()`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, response::IntoResponse};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::ChannelError;
use crate::ledger::StatusSlot;

/// Body returned by the liveness route.
pub const ALIVE_MESSAGE: &str = "Bot is alive!";

/// Configuration for the health server.
pub struct HealthServerConfig {
    /// Address to bind the server to.
    pub addr: SocketAddr,
}

/// Liveness server for hosting platforms that probe over HTTP.
pub struct HealthServer {
    config: HealthServerConfig,
    status: StatusSlot,
    routes: Vec<Router>,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl HealthServer {
    pub fn new(config: HealthServerConfig, status: StatusSlot) -> Self {
        Self {
            config,
            status,
            routes: Vec::new(),
            local_addr: None,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Accumulate a route fragment with its state already applied.
    pub fn add_routes(&mut self, router: Router) {
        self.routes.push(router);
    }

    /// Address actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind the listener, merge the routes, and spawn the server.
    pub async fn start(&mut self) -> Result<(), ChannelError> {
        let mut app = Router::new()
            .route("/", get(alive))
            .route("/status", get(status))
            .with_state(Arc::clone(&self.status));
        for fragment in self.routes.drain(..) {
            app = app.merge(fragment);
        }

        let listener = tokio::net::TcpListener::bind(self.config.addr)
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "health_server".to_string(),
                reason: format!("Failed to bind to {}: {}", self.config.addr, e),
            })?;
        self.local_addr = listener.local_addr().ok();

        tracing::info!("Health server listening on {}", self.config.addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                    tracing::info!("Health server shutting down");
                })
                .await
            {
                tracing::error!("Health server error: {}", e);
            }
        });

        self.handle = Some(handle);
        Ok(())
    }

    /// Signal graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn alive() -> &'static str {
    ALIVE_MESSAGE
}

async fn status(State(slot): State<StatusSlot>) -> impl IntoResponse {
    let report = slot.read().await.clone();
    Json(serde_json::json!({ "last_tick": report }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{TickCounts, TickReport, TickStatus};

    fn auto_config() -> HealthServerConfig {
        HealthServerConfig {
            addr: "127.0.0.1:0".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn start_and_shutdown_lifecycle() {
        let mut server = HealthServer::new(auto_config(), StatusSlot::default());
        server.start().await.expect("server should start on port 0");
        assert!(server.handle.is_some());
        assert!(server.local_addr().is_some());
        server.shutdown().await;
        assert!(server.handle.is_none());
        assert!(server.shutdown_tx.is_none());
    }

    #[tokio::test]
    async fn root_reports_alive() {
        let mut server = HealthServer::new(auto_config(), StatusSlot::default());
        server.start().await.unwrap();
        let addr = server.local_addr().unwrap();

        let body = reqwest::get(format!("http://{}/", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, ALIVE_MESSAGE);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn status_serves_last_tick() {
        let slot = StatusSlot::default();
        let mut server = HealthServer::new(auto_config(), Arc::clone(&slot));
        server.start().await.unwrap();
        let url = format!("http://{}/status", server.local_addr().unwrap());

        let before: serde_json::Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
        assert!(before["last_tick"].is_null());

        *slot.write().await = Some(TickReport {
            status: TickStatus::Completed,
            counts: TickCounts {
                scanned: 3,
                delivered: 2,
                ..TickCounts::default()
            },
            started_at: chrono::Utc::now(),
            elapsed_ms: 12,
        });

        let after: serde_json::Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
        assert_eq!(after["last_tick"]["status"], "completed");
        assert_eq!(after["last_tick"]["counts"]["delivered"], 2);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn start_on_occupied_port_returns_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let occupied_addr = listener.local_addr().unwrap();

        let mut server = HealthServer::new(
            HealthServerConfig {
                addr: occupied_addr,
            },
            StatusSlot::default(),
        );
        match server.start().await.unwrap_err() {
            ChannelError::StartupFailed { name, reason } => {
                assert_eq!(name, "health_server");
                assert!(reason.contains("Failed to bind"));
            }
            other => panic!("expected StartupFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn shutdown_when_not_started_is_noop() {
        let mut server = HealthServer::new(auto_config(), StatusSlot::default());
        server.shutdown().await;
    }
}
