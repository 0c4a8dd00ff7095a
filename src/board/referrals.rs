//! Referral Store: canonical referral records and their attachments.
//!
//! Operations here never touch dashboards. Callers broadcast the
//! create/delete cascade themselves (see `board::sync`).

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use super::BoardError;
use crate::config::Config;
use crate::db::repository::{self, now};
use crate::models::*;
use crate::storage::{FileUpload, ObjectStorage, StorageError};

/// Contact numbers: a leading 9 followed by nine digits.
static CONTACT_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^9\d{9}$").unwrap());

/// Which uploads are accepted before anything reaches storage.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub allowed_types: Vec<String>,
    pub max_file_size: usize,
}

impl UploadPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            allowed_types: config.allowed_file_types.clone(),
            max_file_size: config.max_file_size,
        }
    }

    pub fn check(&self, upload: &FileUpload) -> Result<(), BoardError> {
        if upload.bytes.is_empty() {
            return Err(BoardError::bad_request(format!("File '{}' is empty", upload.name)));
        }
        if upload.bytes.len() > self.max_file_size {
            return Err(BoardError::bad_request(format!(
                "File '{}' exceeds the {} byte limit",
                upload.name, self.max_file_size
            )));
        }
        match upload.extension() {
            Some(ext) if self.allowed_types.iter().any(|allowed| allowed == &ext) => Ok(()),
            _ => Err(BoardError::bad_request(format!(
                "File '{}' has an unsupported type (allowed: {})",
                upload.name,
                self.allowed_types.join(", ")
            ))),
        }
    }
}

/// Result of an update. Files whose storage object could not be released
/// stay attached and are listed in `unreleased`.
#[derive(Debug)]
pub struct UpdateOutcome {
    pub referral: Referral,
    pub unreleased: Vec<ReferralFile>,
}

// ─── validation ────────────────────────────────────────────

fn required(field: &str, value: &str) -> Result<String, BoardError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BoardError::bad_request(format!("Field '{field}' is required")));
    }
    Ok(trimmed.to_string())
}

fn contact_number(field: &str, value: &str) -> Result<String, BoardError> {
    let value = required(field, value)?;
    if !CONTACT_NUMBER.is_match(&value) {
        return Err(BoardError::bad_request(format!(
            "Field '{field}' must be 10 digits starting with 9"
        )));
    }
    Ok(value)
}

fn date(field: &str, value: &str) -> Result<NaiveDate, BoardError> {
    let value = required(field, value)?;
    value
        .parse::<NaiveDate>()
        .map_err(|_| BoardError::bad_request(format!("Field '{field}' must be a YYYY-MM-DD date")))
}

fn clean_medications(medications: &[String]) -> Vec<String> {
    medications
        .iter()
        .map(|m| m.trim())
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

fn clean_notes(notes: Option<&str>) -> Option<String> {
    notes
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

/// A patch value that is present and non-blank.
fn provided(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn build_referral(data: &NewReferral, posted_by: Uuid) -> Result<Referral, BoardError> {
    let created = now();
    let medications = clean_medications(&data.medications);
    if medications.is_empty() {
        return Err(BoardError::bad_request("Field 'medications' is required"));
    }
    Ok(Referral {
        id: Uuid::new_v4(),
        patient_name: required("patient_name", &data.patient_name)?,
        dob: date("dob", &data.dob)?,
        gender: required("gender", &data.gender)?,
        patient_number: contact_number("patient_number", &data.patient_number)?,
        address: required("address", &data.address)?,
        doctor_name: required("doctor_name", &data.doctor_name)?,
        doctor_number: contact_number("doctor_number", &data.doctor_number)?,
        referral_date: date("referral_date", &data.referral_date)?,
        reason: required("reason", &data.reason)?,
        medications,
        priority: required("priority", &data.priority)?,
        notes: clean_notes(data.notes.as_deref()),
        files: Vec::new(),
        posted_by,
        created_at: created,
        updated_at: created,
    })
}

fn apply_patch(referral: &mut Referral, patch: &ReferralPatch) -> Result<(), BoardError> {
    if let Some(v) = provided(&patch.patient_name) {
        referral.patient_name = required("patient_name", v)?;
    }
    if let Some(v) = provided(&patch.dob) {
        referral.dob = date("dob", v)?;
    }
    if let Some(v) = provided(&patch.gender) {
        referral.gender = required("gender", v)?;
    }
    if let Some(v) = provided(&patch.patient_number) {
        referral.patient_number = contact_number("patient_number", v)?;
    }
    if let Some(v) = provided(&patch.address) {
        referral.address = required("address", v)?;
    }
    if let Some(v) = provided(&patch.doctor_name) {
        referral.doctor_name = required("doctor_name", v)?;
    }
    if let Some(v) = provided(&patch.doctor_number) {
        referral.doctor_number = contact_number("doctor_number", v)?;
    }
    if let Some(v) = provided(&patch.referral_date) {
        referral.referral_date = date("referral_date", v)?;
    }
    if let Some(v) = provided(&patch.reason) {
        referral.reason = required("reason", v)?;
    }
    if let Some(meds) = &patch.medications {
        let meds = clean_medications(meds);
        if !meds.is_empty() {
            referral.medications = meds;
        }
    }
    if let Some(v) = provided(&patch.priority) {
        referral.priority = required("priority", v)?;
    }
    if let Some(notes) = clean_notes(patch.notes.as_deref()) {
        referral.notes = Some(notes);
    }
    Ok(())
}

// ─── storage helpers ───────────────────────────────────────

/// Upload every file or none: on the first failure, objects already stored
/// by this call are removed again.
fn upload_all(
    storage: &dyn ObjectStorage,
    uploads: &[FileUpload],
) -> Result<Vec<ReferralFile>, BoardError> {
    let mut stored = Vec::with_capacity(uploads.len());
    for upload in uploads {
        match storage.store(upload) {
            Ok(object) => stored.push(ReferralFile {
                url: object.url,
                storage_id: object.storage_id,
                name: upload.name.clone(),
            }),
            Err(e) => {
                tracing::warn!(file = %upload.name, error = %e, "Upload failed, rolling back");
                release_files(storage, &stored);
                return Err(e.into());
            }
        }
    }
    Ok(stored)
}

/// Best-effort release of stored objects. Returns the files that could not
/// be released; an object that is already gone counts as released.
pub fn release_files(storage: &dyn ObjectStorage, files: &[ReferralFile]) -> Vec<ReferralFile> {
    let mut unreleased = Vec::new();
    for file in files {
        match storage.remove(&file.storage_id) {
            Ok(()) | Err(StorageError::Missing(_)) => {}
            Err(e) => {
                tracing::warn!(storage_id = %file.storage_id, error = %e, "Stored object not released");
                unreleased.push(file.clone());
            }
        }
    }
    unreleased
}

// ─── operations ────────────────────────────────────────────

/// Validate, upload attachments, then persist. A storage or database failure
/// leaves neither a referral row nor stray objects behind.
pub fn create(
    conn: &mut Connection,
    storage: &dyn ObjectStorage,
    policy: &UploadPolicy,
    data: &NewReferral,
    files: &[FileUpload],
    author: Uuid,
) -> Result<Referral, BoardError> {
    let mut referral = build_referral(data, author)?;
    if files.is_empty() {
        return Err(BoardError::bad_request("At least one file must be attached"));
    }
    for upload in files {
        policy.check(upload)?;
    }

    referral.files = upload_all(storage, files)?;

    let persisted = (|| -> Result<(), BoardError> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        repository::insert_referral(&tx, &referral)?;
        tx.commit()?;
        Ok(())
    })();
    if let Err(e) = persisted {
        release_files(storage, &referral.files);
        return Err(e);
    }

    tracing::info!(referral_id = %referral.id, files = referral.files.len(), "Referral created");
    Ok(referral)
}

/// Apply a partial update plus file additions and removals.
///
/// Additions are uploaded first. The referral is then reloaded, patched and
/// written back inside one IMMEDIATE transaction, so concurrent updates
/// serialize instead of overwriting each other. Additions are released again
/// whenever the update fails.
///
/// `remove_storage_ids` naming files that are not attached are ignored.
pub fn update(
    conn: &mut Connection,
    storage: &dyn ObjectStorage,
    policy: &UploadPolicy,
    id: &Uuid,
    patch: &ReferralPatch,
    additions: &[FileUpload],
    remove_storage_ids: &[String],
) -> Result<UpdateOutcome, BoardError> {
    for upload in additions {
        policy.check(upload)?;
    }
    let added = upload_all(storage, additions)?;

    let result = (|| -> Result<UpdateOutcome, BoardError> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut referral =
            repository::get_referral(&tx, id)?.ok_or_else(|| BoardError::not_found("referral", id))?;
        apply_patch(&mut referral, patch)?;

        let (to_remove, mut kept): (Vec<ReferralFile>, Vec<ReferralFile>) = referral
            .files
            .drain(..)
            .partition(|f| remove_storage_ids.iter().any(|sid| sid == &f.storage_id));
        let unreleased = release_files(storage, &to_remove);
        kept.extend(unreleased.iter().cloned());
        kept.extend(added.iter().cloned());
        referral.files = kept;
        referral.updated_at = now();

        repository::update_referral(&tx, &referral)?;
        tx.commit()?;

        tracing::info!(
            referral_id = %referral.id,
            added = added.len(),
            removed = to_remove.len() - unreleased.len(),
            unreleased = unreleased.len(),
            "Referral updated"
        );
        Ok(UpdateOutcome {
            referral,
            unreleased,
        })
    })();

    if result.is_err() {
        release_files(storage, &added);
    }
    result
}

/// Delete the referral row and hand back what was removed, so the caller can
/// release its files and broadcast the cascade.
pub fn delete(conn: &mut Connection, id: &Uuid) -> Result<Referral, BoardError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let referral =
        repository::get_referral(&tx, id)?.ok_or_else(|| BoardError::not_found("referral", id))?;
    repository::delete_referral(&tx, id)?;
    tx.commit()?;
    tracing::info!(referral_id = %id, "Referral deleted");
    Ok(referral)
}

pub fn list(conn: &Connection, filter: &ReferralFilter) -> Result<Vec<Referral>, BoardError> {
    Ok(repository::list_referrals(conn, filter)?)
}
