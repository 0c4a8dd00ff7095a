//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub name: &'static str,
    pub version: &'static str,
    pub database: bool,
}

/// `GET /api/health`: liveness, no identity required.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    let database = ctx.core.open_db().is_ok();

    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        name: crate::config::APP_NAME,
        version: crate::config::APP_VERSION,
        database,
    })
}
