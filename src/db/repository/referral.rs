use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{format_datetime, parse_date, parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

const REFERRAL_COLUMNS: &str = "id, patient_name, dob, gender, patient_number, address,
     doctor_name, doctor_number, referral_date, reason, medications, priority, notes,
     posted_by, created_at, updated_at";

/// Insert a referral and its file list. Run inside a transaction.
pub fn insert_referral(conn: &Connection, referral: &Referral) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO referrals (id, patient_name, dob, gender, patient_number, address,
         doctor_name, doctor_number, referral_date, reason, medications, priority, notes,
         posted_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            referral.id.to_string(),
            referral.patient_name,
            referral.dob.to_string(),
            referral.gender,
            referral.patient_number,
            referral.address,
            referral.doctor_name,
            referral.doctor_number,
            referral.referral_date.to_string(),
            referral.reason,
            encode_medications(&referral.medications)?,
            referral.priority,
            referral.notes,
            referral.posted_by.to_string(),
            format_datetime(&referral.created_at),
            format_datetime(&referral.updated_at),
        ],
    )?;
    replace_referral_files(conn, &referral.id, &referral.files)?;
    Ok(())
}

/// Overwrite every stored field and the file list. Run inside a transaction.
pub fn update_referral(conn: &Connection, referral: &Referral) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE referrals SET patient_name = ?2, dob = ?3, gender = ?4, patient_number = ?5,
         address = ?6, doctor_name = ?7, doctor_number = ?8, referral_date = ?9, reason = ?10,
         medications = ?11, priority = ?12, notes = ?13, updated_at = ?14
         WHERE id = ?1",
        params![
            referral.id.to_string(),
            referral.patient_name,
            referral.dob.to_string(),
            referral.gender,
            referral.patient_number,
            referral.address,
            referral.doctor_name,
            referral.doctor_number,
            referral.referral_date.to_string(),
            referral.reason,
            encode_medications(&referral.medications)?,
            referral.priority,
            referral.notes,
            format_datetime(&referral.updated_at),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("referral", referral.id));
    }
    replace_referral_files(conn, &referral.id, &referral.files)?;
    Ok(())
}

/// Delete a referral row (files go with it). Dashboards are not touched.
pub fn delete_referral(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM referrals WHERE id = ?1",
        params![id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("referral", id));
    }
    Ok(())
}

pub fn get_referral(conn: &Connection, id: &Uuid) -> Result<Option<Referral>, DatabaseError> {
    let sql = format!("SELECT {REFERRAL_COLUMNS} FROM referrals WHERE id = ?1");
    let raw = conn
        .query_row(&sql, params![id.to_string()], ReferralRow::from_row)
        .optional()?;
    match raw {
        Some(raw) => {
            let files = get_referral_files(conn, id)?;
            Ok(Some(raw.into_referral(files)?))
        }
        None => Ok(None),
    }
}

pub fn referral_exists(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM referrals WHERE id = ?1",
            params![id.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Referrals ordered by referral date, then creation time.
pub fn list_referrals(
    conn: &Connection,
    filter: &ReferralFilter,
) -> Result<Vec<Referral>, DatabaseError> {
    let sql = format!(
        "SELECT {REFERRAL_COLUMNS} FROM referrals
         WHERE (?1 IS NULL OR posted_by = ?1)
         ORDER BY referral_date ASC, created_at ASC, rowid ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![filter.posted_by.map(|id| id.to_string())],
        ReferralRow::from_row,
    )?;
    let raws = rows.collect::<Result<Vec<_>, _>>()?;

    let mut files = all_referral_files(conn)?;
    raws.into_iter()
        .map(|raw| {
            let attached = files.remove(&raw.id).unwrap_or_default();
            raw.into_referral(attached)
        })
        .collect()
}

/// Ids of every stored referral in creation order.
pub fn list_referral_ids(conn: &Connection) -> Result<Vec<Uuid>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT id FROM referrals ORDER BY created_at ASC, rowid ASC")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut ids = Vec::new();
    for raw in rows {
        ids.push(parse_uuid("referrals.id", &raw?)?);
    }
    Ok(ids)
}

fn replace_referral_files(
    conn: &Connection,
    referral_id: &Uuid,
    files: &[ReferralFile],
) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM referral_files WHERE referral_id = ?1",
        params![referral_id.to_string()],
    )?;
    let mut stmt = conn.prepare(
        "INSERT INTO referral_files (referral_id, position, url, storage_id, name)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (position, file) in files.iter().enumerate() {
        stmt.execute(params![
            referral_id.to_string(),
            position as i64,
            file.url,
            file.storage_id,
            file.name,
        ])?;
    }
    Ok(())
}

fn get_referral_files(conn: &Connection, referral_id: &Uuid) -> Result<Vec<ReferralFile>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT url, storage_id, name FROM referral_files
         WHERE referral_id = ?1 ORDER BY position ASC",
    )?;
    let rows = stmt.query_map(params![referral_id.to_string()], |row| {
        Ok(ReferralFile {
            url: row.get(0)?,
            storage_id: row.get(1)?,
            name: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn all_referral_files(conn: &Connection) -> Result<HashMap<String, Vec<ReferralFile>>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT referral_id, url, storage_id, name FROM referral_files
         ORDER BY referral_id, position ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            ReferralFile {
                url: row.get(1)?,
                storage_id: row.get(2)?,
                name: row.get(3)?,
            },
        ))
    })?;
    let mut grouped: HashMap<String, Vec<ReferralFile>> = HashMap::new();
    for row in rows {
        let (referral_id, file) = row?;
        grouped.entry(referral_id).or_default().push(file);
    }
    Ok(grouped)
}

fn encode_medications(medications: &[String]) -> Result<String, DatabaseError> {
    serde_json::to_string(medications).map_err(|e| DatabaseError::InvalidValue {
        field: "medications".into(),
        value: e.to_string(),
    })
}

/// Raw column values, converted once the statement has been stepped.
struct ReferralRow {
    id: String,
    patient_name: String,
    dob: String,
    gender: String,
    patient_number: String,
    address: String,
    doctor_name: String,
    doctor_number: String,
    referral_date: String,
    reason: String,
    medications: String,
    priority: String,
    notes: Option<String>,
    posted_by: String,
    created_at: String,
    updated_at: String,
}

impl ReferralRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            patient_name: row.get(1)?,
            dob: row.get(2)?,
            gender: row.get(3)?,
            patient_number: row.get(4)?,
            address: row.get(5)?,
            doctor_name: row.get(6)?,
            doctor_number: row.get(7)?,
            referral_date: row.get(8)?,
            reason: row.get(9)?,
            medications: row.get(10)?,
            priority: row.get(11)?,
            notes: row.get(12)?,
            posted_by: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    fn into_referral(self, files: Vec<ReferralFile>) -> Result<Referral, DatabaseError> {
        let medications: Vec<String> =
            serde_json::from_str(&self.medications).map_err(|_| DatabaseError::InvalidValue {
                field: "medications".into(),
                value: self.medications.clone(),
            })?;
        Ok(Referral {
            id: parse_uuid("referrals.id", &self.id)?,
            patient_name: self.patient_name,
            dob: parse_date("dob", &self.dob)?,
            gender: self.gender,
            patient_number: self.patient_number,
            address: self.address,
            doctor_name: self.doctor_name,
            doctor_number: self.doctor_number,
            referral_date: parse_date("referral_date", &self.referral_date)?,
            reason: self.reason,
            medications,
            priority: self.priority,
            notes: self.notes,
            files,
            posted_by: parse_uuid("posted_by", &self.posted_by)?,
            created_at: parse_datetime("created_at", &self.created_at)?,
            updated_at: parse_datetime("updated_at", &self.updated_at)?,
        })
    }
}
