//! HTTP surface: banner, health check, bulk load and the Event Channel upgrade.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State, ws::WebSocketUpgrade},
    http::HeaderMap,
    response::IntoResponse,
};
use strokesync_core::StrokeGroup;
use tracing::{debug, info};

use crate::error::ServerError;
use crate::identity::{Identity, credential};
use crate::relay::{AppState, handle_socket};

/// Index page
pub async fn index() -> &'static str {
    "StrokeSync Relay Server - Connect via WebSocket at /ws"
}

/// Health check
pub async fn health() -> &'static str {
    "ok"
}

fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> Result<Identity, ServerError> {
    let token = credential(headers, query).ok_or(ServerError::Unauthorized)?;
    state.identity.resolve(token).ok_or_else(|| {
        debug!("Rejected unknown credential");
        ServerError::Unauthorized
    })
}

/// Every persisted group in append order.
pub async fn list_drawings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Vec<StrokeGroup>>, ServerError> {
    let identity = authenticate(&state, &headers, &query)?;
    let groups = state.repository.list_all().await?;
    debug!("Serving {} groups to {}", groups.len(), identity.author_id);
    Ok(Json(groups))
}

/// WebSocket upgrade handler. Unknown credentials are refused before the
/// upgrade, so no presence state is created for them.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServerError> {
    let identity = authenticate(&state, &headers, &query)?;
    info!("Admitting {} ({})", identity.author_id, identity.display_name);
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, identity)))
}
