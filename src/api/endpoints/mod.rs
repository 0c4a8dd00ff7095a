//! API endpoint handlers.
//!
//! Each handler passes the authorization gate first, then calls exactly
//! one board operation.

pub mod dashboard;
pub mod health;
pub mod referrals;
pub mod users;

use uuid::Uuid;

use crate::api::error::ApiError;

/// Parse a UUID path or query value, naming the field on failure.
pub(crate) fn parse_id(field: &str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::BadRequest(format!("Invalid {field}: {raw}")))
}
