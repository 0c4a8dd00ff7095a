//! User directory endpoints.

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::Extension;
use serde::Deserialize;

use super::parse_id;
use crate::api::error::ApiError;
use crate::api::types::{ActorContext, ApiContext, ApiResponse};
use crate::authorization::{authorize, Capability};
use crate::board::users;
use crate::models::{User, UserFilter, UserRole};

/// `GET /api/users/me`
pub async fn me(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
) -> Result<ApiResponse<User>, ApiError> {
    authorize(&actor, Capability::ViewOwnProfile)?;
    let conn = ctx.core.open_db()?;
    let user = users::get(&conn, &actor.user_id)?;
    Ok(ApiResponse::ok(user, "Profile fetched"))
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub role: Option<String>,
}

/// `GET /api/users?role=`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Query(query): Query<UserQuery>,
) -> Result<ApiResponse<Vec<User>>, ApiError> {
    authorize(&actor, Capability::ManageUsers)?;
    let role = query
        .role
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .map(|raw| UserRole::from_str(raw).map_err(|_| ApiError::BadRequest(format!("Unknown role: {raw}"))))
        .transpose()?;

    let conn = ctx.core.open_db()?;
    let found = users::list(&conn, &UserFilter { role })?;
    Ok(ApiResponse::ok(found, "Users fetched"))
}

/// `DELETE /api/users/:id`
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    authorize(&actor, Capability::ManageUsers)?;
    let id = parse_id("user id", &id)?;
    let conn = ctx.core.open_db()?;
    users::delete(&conn, &id)?;
    Ok(ApiResponse::ok(serde_json::json!({ "id": id }), "User deleted"))
}
