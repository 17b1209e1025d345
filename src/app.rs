//! Application state and HTTP router construction.
//!
//! Used by [HttpServerService](crate::services::http_server::HttpServerService)
//! to build the Axum app, and by the integration tests directly.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::graphql::handlers::{graphql_get_handler, graphql_handler};
use crate::graphql::{AuthGate, PostboardSchema};

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub schema: PostboardSchema,
    pub auth: Arc<AuthGate>,
}

async fn hello() -> &'static str {
    "Hello World!"
}

/// Build the full Axum router: `/`, the GraphQL path, CORS and request tracing.
pub fn build_app(state: AppState) -> Router<()> {
    let graphql_path = state.config.graphql_path.clone();

    Router::new()
        .route("/", get(hello))
        .route(
            &graphql_path,
            get(graphql_get_handler).post(graphql_handler),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
