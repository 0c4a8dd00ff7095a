//! Identity middleware.
//!
//! The service sits behind an authenticating gateway that forwards the
//! verified actor in `X-User-Id` / `X-User-Role` (plus optional
//! `X-User-Email` and `X-User-Name`). Missing or malformed headers are
//! rejected with 401. On success the actor is recorded in the user
//! directory and `ActorContext` is injected for downstream handlers.

use std::str::FromStr;

use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ActorContext, ApiContext};
use crate::board::users::{self, ActorProfile};
use crate::models::UserRole;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_NAME_HEADER: &str = "x-user-name";

pub async fn require_identity(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_identity_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_identity_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let profile = parse_identity(req.headers())?;

    {
        let conn = ctx.core.open_db()?;
        users::record_actor(&conn, &profile)?;
    } // connection dropped before the handler runs

    req.extensions_mut().insert(ActorContext {
        user_id: profile.user_id,
        role: profile.role,
    });

    Ok(next.run(req).await)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub(crate) fn parse_identity(headers: &HeaderMap) -> Result<ActorProfile, ApiError> {
    let user_id = header(headers, USER_ID_HEADER)
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or(ApiError::Unauthorized)?;
    let role = header(headers, USER_ROLE_HEADER)
        .and_then(|raw| UserRole::from_str(&raw.to_ascii_lowercase()).ok())
        .ok_or(ApiError::Unauthorized)?;

    Ok(ActorProfile {
        user_id,
        role,
        display_name: header(headers, USER_NAME_HEADER).map(str::to_string),
        email: header(headers, USER_EMAIL_HEADER).map(str::to_string),
    })
}
