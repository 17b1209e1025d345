//! Postboard: a GraphQL API over users and their posts
//!
//! Queries and mutations go over HTTP, `postCreated` subscriptions over a
//! WebSocket on the same path. Every request passes the JWT gate in
//! [graphql::auth] first.

pub mod app;
pub mod config;
pub mod db;
pub mod graphql;
pub mod services;

pub use app::{AppState, build_app};
pub use config::Config;
