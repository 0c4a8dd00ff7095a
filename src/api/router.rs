//! HTTP router.
//!
//! Returns a composable `Router` with every board route under `/api/`,
//! stored attachments under `/files/`.
//!
//! Middleware stack on protected routes (outermost → innermost):
//! 1. Extension(ApiContext) → 2. Identity → 3. Audit → Handler

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{delete, get, patch, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::config::Config;
use crate::core_state::CoreState;

/// Build the board API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>) -> Router {
    let ctx = ApiContext::new(core);
    build_router(ctx)
}

fn build_router(ctx: ApiContext) -> Router {
    let config = ctx.core.config.clone();

    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route(
            "/dashboard",
            get(endpoints::dashboard::get_own).patch(endpoints::dashboard::set_own),
        )
        .route("/dashboard/summary", get(endpoints::dashboard::summary))
        .route(
            "/dashboard/users/:user_id",
            get(endpoints::dashboard::get_for_user).patch(endpoints::dashboard::set_for_user),
        )
        .route(
            "/dashboards/:dashboard_id/referrals/:referral_id/delete",
            patch(endpoints::dashboard::soft_delete),
        )
        .route(
            "/dashboards/:dashboard_id/referrals/:referral_id/restore",
            patch(endpoints::dashboard::restore),
        )
        .route(
            "/referrals",
            get(endpoints::referrals::list).post(endpoints::referrals::create),
        )
        .route(
            "/referrals/:id",
            put(endpoints::referrals::update).delete(endpoints::referrals::delete),
        )
        .route("/users/me", get(endpoints::users::me))
        .route("/users", get(endpoints::users::list))
        .route("/users/:id", delete(endpoints::users::delete))
        .with_state(ctx.clone())
        // Middleware stack (innermost first, outermost last):
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::identity::require_identity))
        // Extension must be outermost so middleware can extract ApiContext
        .layer(axum::Extension(ctx.clone()));

    let public = Router::new()
        .route("/health", get(endpoints::health::check))
        .with_state(ctx);

    let app = Router::new()
        .nest("/api", protected.merge(public))
        .nest_service("/files", ServeDir::new(config.uploads_dir()))
        .layer(DefaultBodyLimit::max(config.request_body_limit()))
        .layer(TraceLayer::new_for_http());

    match cors_layer(&config) {
        Some(cors) => app.layer(cors),
        None => app,
    }
}

fn cors_layer(config: &Config) -> Option<CorsLayer> {
    let origin = config.cors_origin.as_deref()?;
    match origin.parse::<HeaderValue>() {
        Ok(value) => Some(
            CorsLayer::new()
                .allow_origin(value)
                .allow_methods(Any)
                .allow_headers(Any),
        ),
        Err(_) => {
            tracing::warn!(origin, "Ignoring unparseable CORS origin");
            None
        }
    }
}
