//! HTTP API handlers and routing.

pub mod error;
mod health;

use axum::{
    extract::{Path, State},
    http::header::CONTENT_TYPE,
    response::IntoResponse,
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use error::ApiError;

/// Create the router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .route("/gettac/{slave}", get(get_tac))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Allocate the slave and return its `buildbot.tac`.
async fn get_tac(
    State(state): State<AppState>,
    Path(slave): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tac = state.allocator().get_buildbot_tac(&slave).await?;
    Ok(([(CONTENT_TYPE, "text/plain; charset=utf-8")], tac))
}
