//! StrokeSync WebSocket Relay Server
//!
//! Relays live stroke points between authors, persists completed stroke
//! groups and tracks who is online.
//!
//! ## Protocol
//!
//! Messages are JSON tagged by `type`:
//! ```json
//! { "type": "draw", "x": 10, "y": 20, "phase": "begin", "width": 2, "color": "#000", "groupId": "..." }
//! { "type": "persistGroups", "groups": [ { "groupId": "...", "points": [ ... ] } ] }
//! { "type": "removeGroup", "groupId": "..." }
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod presence;
pub mod relay;
pub mod routes;

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::ServerError;
pub use identity::{Identity, IdentityProvider, TokenIdentityProvider};
pub use relay::AppState;

/// Build the application router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/ws", get(routes::ws_handler))
        .route("/health", get(routes::health))
        .route("/api/drawings", get(routes::list_drawings))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
