//! Application configuration management

use std::env;

use anyhow::{Context, Result, bail};

/// Auth Gate settings loaded from the environment
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// HMAC signing key for HS256 tokens
    pub jwt_secret: String,

    /// RSA public key (PEM) for RS256 tokens. RS256 is refused when unset.
    pub jwt_public_key: Option<String>,

    /// Required `aud` claim
    pub audience: String,

    /// Reject requests that carry no token
    pub reject_on_missing_token: bool,

    /// Reject requests whose token fails verification
    pub reject_on_invalid_token: bool,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// Path the GraphQL endpoint is mounted on
    pub graphql_path: String,

    /// SQLite connection URL
    pub database_url: String,

    /// Maximum pooled database connections
    pub database_max_connections: u32,

    /// Topic name of the post notification channel
    pub notification_topic: String,

    /// Buffered events per subscriber before it starts lagging
    pub notification_capacity: usize,

    /// Emit JSON logs (default) instead of human readable ones
    pub log_json: bool,

    pub auth: AuthSettings,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // The signing key is the one setting without a usable default
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET is required")?;
        let jwt_secret = jwt_secret.trim().to_string();
        if jwt_secret.is_empty() {
            bail!("JWT_SECRET must not be empty");
        }

        let graphql_path = env::var("GRAPHQL_PATH").unwrap_or_else(|_| "/graphql".to_string());
        if !graphql_path.starts_with('/') || graphql_path == "/" {
            bail!("GRAPHQL_PATH must start with '/' and must not be the root path");
        }

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("Invalid PORT")?,

            graphql_path,

            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:postboard.db".to_string()),

            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),

            notification_topic: env::var("ROUTING_PUB")
                .unwrap_or_else(|_| "POST_CREATED".to_string()),

            notification_capacity: env::var("NOTIFICATION_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(64),

            log_json: env::var("LOG_FORMAT")
                .map(|v| !v.eq_ignore_ascii_case("pretty"))
                .unwrap_or(true),

            auth: AuthSettings {
                jwt_secret,
                jwt_public_key: env::var("JWT_PUBLIC_KEY").ok().filter(|k| !k.trim().is_empty()),
                audience: env::var("JWT_AUDIENCE").unwrap_or_else(|_| "my-audience".to_string()),
                reject_on_missing_token: env_flag("AUTH_REJECT_MISSING_TOKEN", true),
                reject_on_invalid_token: env_flag("AUTH_REJECT_INVALID_TOKEN", true),
            },
        })
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name).map(|v| parse_flag(&v, default)).unwrap_or(default)
}

fn parse_flag(value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}
