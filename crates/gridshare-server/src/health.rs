use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

/// Structured health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub sessions: SessionInfo,
}

#[derive(Serialize)]
pub struct SessionInfo {
    pub active: usize,
    pub capacity: usize,
}

/// GET /health: server status and room occupancy as JSON.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        sessions: SessionInfo {
            active: state.room.count(),
            capacity: state.room.capacity(),
        },
    })
}
