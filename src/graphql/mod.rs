//! GraphQL API with subscriptions for real-time updates
//!
//! This module provides a GraphQL API using async-graphql with support for
//! queries, mutations, and subscriptions over WebSocket.
//!
//! This is the single API surface of the server. [handlers] wires it to HTTP
//! and runs the [auth] gate before anything executes.

pub mod auth;
pub mod error;
pub mod handlers;
mod schema;
mod subscriptions;
pub mod types;

pub use auth::{AuthClaims, AuthError, AuthExt, AuthGate, AuthPolicy};
pub use error::ApiError;
pub use schema::{MutationRoot, PostNotifications, PostboardSchema, QueryRoot, build_schema};
pub use subscriptions::SubscriptionRoot;
pub use types::{Post, User};
