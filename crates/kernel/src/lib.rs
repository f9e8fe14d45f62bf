//! Quire Micropub Kernel Library
//!
//! A micropub endpoint for static sites: entries arrive as forms or JSON,
//! are normalized and mapped into front-matter documents, and can be read
//! back as a paged microsub timeline.
//! The main entry point for running the server is the `quire` binary.

pub mod auth;
pub mod config;
pub mod entry;
pub mod error;
pub mod front_matter;
pub mod hooks;
pub mod media;
pub mod post;
pub mod routes;
pub mod state;
pub mod timeline;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use config::{Config, SiteConfig};
pub use state::AppState;

/// Build the application router with the micropub endpoint at `micropub_path`.
pub fn build_router(state: AppState, micropub_path: &str) -> Router {
    Router::new()
        .merge(routes::micropub::router(micropub_path))
        .merge(routes::health::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
