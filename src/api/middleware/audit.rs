//! Audit logging middleware.
//!
//! Logs every API request with actor, method, path and response status
//! under the `audit` target. Runs innermost (after identity has injected
//! `ActorContext`).

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::ActorContext;

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let actor = req.extensions().get::<ActorContext>().copied();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    match actor {
        Some(actor) => tracing::info!(
            target: "audit",
            actor = %actor.user_id,
            role = %actor.role,
            %method,
            %path,
            status,
            "API access"
        ),
        None => tracing::info!(target: "audit", %method, %path, status, "API access"),
    }

    response
}
