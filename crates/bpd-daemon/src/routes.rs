//! Axum router for the read-only status API.
//!
//! Middleware layers are attached by the caller so tests can drive the bare
//! router.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};

use crate::{
    api_types::{HealthResponse, MachineStatusResponse},
    state::AppState,
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/machines", get(machines))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/machines
// ---------------------------------------------------------------------------

pub(crate) async fn machines(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let body: Vec<MachineStatusResponse> = st
        .machines
        .snapshot()
        .into_iter()
        .map(MachineStatusResponse::from)
        .collect();
    (StatusCode::OK, Json(body))
}
