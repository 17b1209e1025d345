//! Long-running services and their lifecycle

pub mod database;
pub mod http_server;
pub mod logging;
pub mod manager;
pub mod notifications;

pub use database::DatabaseService;
pub use http_server::HttpServerService;
pub use logging::init_tracing;
pub use manager::{Service, ServicesManager};
pub use notifications::{NotificationChannel, NotificationChannelConfig};
