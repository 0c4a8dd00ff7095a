//! Referral endpoints.
//!
//! - `POST /api/referrals`: multipart: `data` (JSON) + one or more files
//! - `GET /api/referrals?posted_by=`: list
//! - `PUT /api/referrals/:id`: multipart: optional `data` patch,
//!   optional `remove_files` (JSON array of storage ids), new files
//! - `DELETE /api/referrals/:id`: delete everywhere

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::Extension;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::parse_id;
use crate::api::error::ApiError;
use crate::api::types::{ActorContext, ApiContext, ApiResponse};
use crate::authorization::{authorize, Capability};
use crate::board;
use crate::models::{NewReferral, Referral, ReferralFilter, ReferralPatch};
use crate::storage::FileUpload;

/// Decoded multipart body.
struct ReferralForm<T> {
    data: Option<T>,
    remove_files: Vec<String>,
    files: Vec<FileUpload>,
}

async fn read_form<T: DeserializeOwned>(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ReferralForm<T>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let mut form = ReferralForm {
        data: None,
        remove_files: Vec::new(),
        files: Vec::new(),
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read '{file_name}': {e}")))?;
            form.files.push(FileUpload {
                name: file_name,
                bytes: bytes.to_vec(),
            });
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read field '{name}': {e}")))?;
        match name.as_str() {
            "data" => {
                let data = serde_json::from_str(&text)
                    .map_err(|e| ApiError::BadRequest(format!("Invalid referral data: {e}")))?;
                form.data = Some(data);
            }
            "remove_files" => {
                form.remove_files = serde_json::from_str(&text)
                    .map_err(|e| ApiError::BadRequest(format!("Invalid remove_files: {e}")))?;
            }
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }

    Ok(form)
}

/// `POST /api/referrals`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<Referral>, ApiError> {
    authorize(&actor, Capability::ManageReferrals)?;
    let form = read_form::<NewReferral>(multipart).await?;
    let data = form
        .data
        .ok_or_else(|| ApiError::BadRequest("Missing 'data' field".into()))?;

    let created = board::create_referral(ctx.core.clone(), actor.user_id, data, form.files).await?;
    Ok(ApiResponse::created(created.value, "Referral created").with_warnings(created.warnings))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub posted_by: Option<String>,
}

/// `GET /api/referrals`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Query(query): Query<ListQuery>,
) -> Result<ApiResponse<Vec<Referral>>, ApiError> {
    authorize(&actor, Capability::ListReferrals)?;
    let posted_by = query
        .posted_by
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .map(|raw| parse_id("posted_by", raw))
        .transpose()?;

    let referrals = board::list_referrals(&ctx.core, &ReferralFilter { posted_by })?;
    Ok(ApiResponse::ok(referrals, "Referrals fetched"))
}

/// `PUT /api/referrals/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<Referral>, ApiError> {
    authorize(&actor, Capability::ManageReferrals)?;
    let id = parse_id("referral id", &id)?;
    let form = read_form::<ReferralPatch>(multipart).await?;
    let patch = form.data.unwrap_or_default();

    let outcome = board::update_referral(ctx.core.clone(), id, patch, form.files, form.remove_files).await?;
    let warnings = outcome
        .unreleased
        .iter()
        .map(|f| format!("File '{}' ({}) could not be removed and was kept", f.name, f.storage_id))
        .collect();
    Ok(ApiResponse::ok(outcome.referral, "Referral updated").with_warnings(warnings))
}

/// `DELETE /api/referrals/:id`
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Result<ApiResponse<Referral>, ApiError> {
    authorize(&actor, Capability::ManageReferrals)?;
    let id = parse_id("referral id", &id)?;

    let deleted = board::delete_referral_globally(ctx.core.clone(), id).await?;
    Ok(ApiResponse::ok(deleted.value, "Referral deleted").with_warnings(deleted.warnings))
}
