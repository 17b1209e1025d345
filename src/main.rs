//! Postboard server
//!
//! Loads configuration, starts the database and HTTP services, and runs until Ctrl+C.

use std::sync::Arc;

use anyhow::Result;

use postboard::config::Config;
use postboard::graphql::AuthGate;
use postboard::services::{
    DatabaseService, HttpServerService, NotificationChannel, NotificationChannelConfig,
    ServicesManager, init_tracing,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(Config::from_env()?);

    init_tracing(config.log_json);
    tracing::info!("Starting Postboard");

    let auth = Arc::new(AuthGate::new(&config.auth)?);
    tracing::info!(policy = ?auth.policy(), "Auth gate configured");

    let notifications = NotificationChannel::new(NotificationChannelConfig {
        topic: config.notification_topic.clone(),
        channel_capacity: config.notification_capacity,
    });

    let database = Arc::new(DatabaseService::from_config(&config).await?);
    let http = Arc::new(HttpServerService::new(
        config.clone(),
        database.pool().clone(),
        notifications,
        auth,
    ));

    let manager = ServicesManager::new();
    manager.register(database).await;
    manager.register(http).await;

    if let Err(e) = manager.start_all().await {
        tracing::error!(error = %e, "Startup failed");
        manager.stop_all().await?;
        return Err(e);
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    manager.stop_all().await?;
    tracing::info!("Postboard stopped");
    Ok(())
}
