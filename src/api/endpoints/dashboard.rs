//! Dashboard endpoints.
//!
//! - `GET /api/dashboard`: own column partition
//! - `PATCH /api/dashboard`: move a referral on own dashboard
//! - `GET /api/dashboard/summary`: per-status counts (admin)
//! - `GET|PATCH /api/dashboard/users/:user_id`: another user's dashboard (admin)
//! - `PATCH /api/dashboards/:dashboard_id/referrals/:referral_id/delete`
//! - `PATCH /api/dashboards/:dashboard_id/referrals/:referral_id/restore`
//!
//! Delete and restore need edit rights on the dashboard: its owner, or an admin.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;

use super::parse_id;
use crate::api::error::ApiError;
use crate::api::types::{ActorContext, ApiContext, ApiResponse};
use crate::authorization::{authorize, authorize_dashboard_edit, Capability};
use crate::board::{self, ColumnPartition, ReferralWithState, StatusChange, StatusSummary};
use crate::models::Dashboard;

#[derive(Debug, Default, Deserialize)]
pub struct StatusChangeRequest {
    pub referral_id: Option<String>,
    pub new_status: Option<String>,
}

fn status_change(payload: Result<Json<StatusChangeRequest>, JsonRejection>) -> Result<StatusChange, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(StatusChange::parse(
        request.referral_id.as_deref(),
        request.new_status.as_deref(),
    )?)
}

/// `GET /api/dashboard`
pub async fn get_own(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
) -> Result<ApiResponse<ColumnPartition>, ApiError> {
    authorize(&actor, Capability::ViewOwnDashboard)?;
    let columns = board::get_dashboard(&ctx.core, &actor.user_id)?;
    Ok(ApiResponse::ok(columns, "Dashboard fetched"))
}

/// `PATCH /api/dashboard`
pub async fn set_own(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    payload: Result<Json<StatusChangeRequest>, JsonRejection>,
) -> Result<ApiResponse<Dashboard>, ApiError> {
    authorize(&actor, Capability::EditOwnDashboard)?;
    let change = status_change(payload)?;
    let dashboard = board::set_referral_status(&ctx.core, &actor.user_id, &change)?;
    Ok(ApiResponse::ok(dashboard, "Referral status updated"))
}

/// `GET /api/dashboard/summary`
pub async fn summary(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
) -> Result<ApiResponse<StatusSummary>, ApiError> {
    authorize(&actor, Capability::ViewSummary)?;
    let summary = board::admin_summary(&ctx.core)?;
    Ok(ApiResponse::ok(summary, "Summary fetched"))
}

/// `GET /api/dashboard/users/:user_id`
pub async fn get_for_user(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Path(user_id): Path<String>,
) -> Result<ApiResponse<ColumnPartition>, ApiError> {
    authorize(&actor, Capability::ViewAnyDashboard)?;
    let user_id = parse_id("user id", &user_id)?;
    let columns = board::get_dashboard_for_user(&ctx.core, &user_id)?;
    Ok(ApiResponse::ok(columns, "Dashboard fetched"))
}

/// `PATCH /api/dashboard/users/:user_id`
pub async fn set_for_user(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Path(user_id): Path<String>,
    payload: Result<Json<StatusChangeRequest>, JsonRejection>,
) -> Result<ApiResponse<Dashboard>, ApiError> {
    authorize(&actor, Capability::EditAnyDashboard)?;
    let user_id = parse_id("user id", &user_id)?;
    let change = status_change(payload)?;
    let dashboard = board::set_referral_status_for_user(&ctx.core, &user_id, &change)?;
    Ok(ApiResponse::ok(dashboard, "Referral status updated"))
}

/// `PATCH /api/dashboards/:dashboard_id/referrals/:referral_id/delete`
pub async fn soft_delete(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Path((dashboard_id, referral_id)): Path<(String, String)>,
) -> Result<ApiResponse<ReferralWithState>, ApiError> {
    let dashboard_id = parse_id("dashboard id", &dashboard_id)?;
    let referral_id = parse_id("referral id", &referral_id)?;

    let owner = board::dashboard_owner(&ctx.core, &dashboard_id)?;
    authorize_dashboard_edit(&actor, &owner)?;

    let entry = board::soft_delete_referral(&ctx.core, &dashboard_id, &referral_id, actor.user_id)?;
    Ok(ApiResponse::ok(entry, "Referral moved to deleted"))
}

/// `PATCH /api/dashboards/:dashboard_id/referrals/:referral_id/restore`
pub async fn restore(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Path((dashboard_id, referral_id)): Path<(String, String)>,
) -> Result<ApiResponse<ReferralWithState>, ApiError> {
    let dashboard_id = parse_id("dashboard id", &dashboard_id)?;
    let referral_id = parse_id("referral id", &referral_id)?;

    let owner = board::dashboard_owner(&ctx.core, &dashboard_id)?;
    authorize_dashboard_edit(&actor, &owner)?;

    let entry = board::restore_referral(&ctx.core, &dashboard_id, &referral_id)?;
    Ok(ApiResponse::ok(entry, "Referral restored"))
}
