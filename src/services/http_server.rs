//! HTTP server service: binds the Axum app and runs it in a background task.
//!
//! Depends on the database service. Start order is ensured by the service manager;
//! this service builds the schema, [AppState](crate::app::AppState) and the router
//! in [start](Service::start) and runs the server until [stop](Service::stop).

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::info;

use crate::app::{AppState, build_app};
use crate::config::Config;
use crate::db::Database;
use crate::graphql::{AuthGate, PostNotifications, build_schema};
use crate::services::manager::Service;

/// HTTP server service: binds and serves the Axum app in a background task.
pub struct HttpServerService {
    config: Arc<Config>,
    db: Database,
    notifications: PostNotifications,
    auth: Arc<AuthGate>,
    /// Address actually bound; set in start().
    local_addr: parking_lot::RwLock<Option<SocketAddr>>,
    /// JoinHandle for the server task; set in start(), taken in stop().
    join_handle: parking_lot::RwLock<Option<tokio::task::JoinHandle<Result<()>>>>,
    /// Send to trigger server shutdown; set in start(), taken in stop().
    shutdown_tx: parking_lot::RwLock<Option<broadcast::Sender<()>>>,
}

impl HttpServerService {
    pub fn new(
        config: Arc<Config>,
        db: Database,
        notifications: PostNotifications,
        auth: Arc<AuthGate>,
    ) -> Self {
        Self {
            config,
            db,
            notifications,
            auth,
            local_addr: parking_lot::RwLock::new(None),
            join_handle: parking_lot::RwLock::new(None),
            shutdown_tx: parking_lot::RwLock::new(None),
        }
    }

    /// The bound address, once started. Differs from the configured port when that is 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read()
    }
}

#[async_trait]
impl Service for HttpServerService {
    fn name(&self) -> &str {
        "http"
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["database".to_string()]
    }

    async fn start(&self) -> Result<()> {
        info!(service = "http", "HTTP server service starting");

        let schema = build_schema(self.db.clone(), self.notifications.clone());
        let state = AppState {
            config: self.config.clone(),
            schema,
            auth: self.auth.clone(),
        };
        let app = build_app(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("HTTP server: bind to {} failed", addr))?;
        let bound = listener.local_addr().context("HTTP server: no local address")?;

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let mut shutdown_rx = shutdown_tx.subscribe();

        let join = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .context("axum::serve")
        });

        *self.local_addr.write() = Some(bound);
        *self.join_handle.write() = Some(join);
        *self.shutdown_tx.write() = Some(shutdown_tx);

        info!(service = "http", "HTTP server service started");
        info!(
            service = "http",
            "Listening on http://{}; GraphQL: http://localhost:{}{}",
            bound,
            bound.port(),
            self.config.graphql_path
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let tx = self.shutdown_tx.write().take();
        let handle = self.join_handle.write().take();
        if let Some(tx) = tx {
            let _ = tx.send(());
        }
        if let Some(h) = handle {
            match h.await {
                Ok(Err(e)) => tracing::warn!(service = "http", error = %e, "Server exited with error"),
                Err(e) => tracing::warn!(service = "http", error = %e, "Server task panicked"),
                Ok(Ok(())) => {}
            }
        }
        *self.local_addr.write() = None;
        info!(service = "http", "HTTP server service stopped");
        Ok(())
    }
}
