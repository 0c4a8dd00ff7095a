use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical referral record. Dashboard status never lives here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Referral {
    pub id: Uuid,
    pub patient_name: String,
    pub dob: NaiveDate,
    pub gender: String,
    pub patient_number: String,
    pub address: String,
    pub doctor_name: String,
    pub doctor_number: String,
    pub referral_date: NaiveDate,
    pub reason: String,
    pub medications: Vec<String>,
    pub priority: String,
    pub notes: Option<String>,
    pub files: Vec<ReferralFile>,
    pub posted_by: Uuid,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// An uploaded attachment, identified by the object storage that holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralFile {
    pub url: String,
    pub storage_id: String,
    pub name: String,
}

/// Staff-supplied fields for a new referral. Missing fields deserialize as
/// blank so validation can name them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewReferral {
    pub patient_name: String,
    pub dob: String,
    pub gender: String,
    pub patient_number: String,
    pub address: String,
    pub doctor_name: String,
    pub doctor_number: String,
    pub referral_date: String,
    pub reason: String,
    pub medications: Vec<String>,
    pub priority: String,
    pub notes: Option<String>,
}

/// Partial update. `None` (or a blank string) keeps the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferralPatch {
    pub patient_name: Option<String>,
    pub dob: Option<String>,
    pub gender: Option<String>,
    pub patient_number: Option<String>,
    pub address: Option<String>,
    pub doctor_name: Option<String>,
    pub doctor_number: Option<String>,
    pub referral_date: Option<String>,
    pub reason: Option<String>,
    pub medications: Option<Vec<String>>,
    pub priority: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Default)]
pub struct ReferralFilter {
    pub posted_by: Option<Uuid>,
}
