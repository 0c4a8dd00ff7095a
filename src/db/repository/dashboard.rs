use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_datetime, now, parse_optional_uuid, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

/// Insert a new dashboard together with its initial states.
pub fn insert_dashboard(conn: &Connection, dashboard: &Dashboard) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO dashboards (id, user_id, created_at) VALUES (?1, ?2, ?3)",
        params![
            dashboard.id.to_string(),
            dashboard.user_id.to_string(),
            format_datetime(&now()),
        ],
    )?;
    upsert_states(conn, dashboard)
}

/// Idempotent upsert keyed by dashboard id. Every in-memory state is written;
/// stored states missing from `dashboard` are left alone (only the referral
/// deletion cascade removes states).
pub fn save_dashboard(conn: &Connection, dashboard: &Dashboard) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO dashboards (id, user_id, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO NOTHING",
        params![
            dashboard.id.to_string(),
            dashboard.user_id.to_string(),
            format_datetime(&now()),
        ],
    )?;
    upsert_states(conn, dashboard)
}

fn upsert_states(conn: &Connection, dashboard: &Dashboard) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO referral_states (dashboard_id, referral_id, status, previous_status, deleted_by)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(dashboard_id, referral_id) DO UPDATE SET
            status = excluded.status,
            previous_status = excluded.previous_status,
            deleted_by = excluded.deleted_by",
    )?;
    for state in &dashboard.states {
        stmt.execute(params![
            dashboard.id.to_string(),
            state.referral_id.to_string(),
            state.status.as_str(),
            state.previous_status.map(|s| s.as_str()),
            state.deleted_by.map(|id| id.to_string()),
        ])?;
    }
    Ok(())
}

pub fn get_dashboard(conn: &Connection, id: &Uuid) -> Result<Option<Dashboard>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, user_id FROM dashboards WHERE id = ?1",
            params![id.to_string()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;
    row.map(|(id, user_id)| load_dashboard(conn, &id, &user_id))
        .transpose()
}

pub fn get_dashboard_by_user(
    conn: &Connection,
    user_id: &Uuid,
) -> Result<Option<Dashboard>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, user_id FROM dashboards WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;
    row.map(|(id, user_id)| load_dashboard(conn, &id, &user_id))
        .transpose()
}

fn load_dashboard(conn: &Connection, id: &str, user_id: &str) -> Result<Dashboard, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT referral_id, status, previous_status, deleted_by
         FROM referral_states WHERE dashboard_id = ?1 ORDER BY seq ASC",
    )?;
    let rows = stmt.query_map(params![id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;

    let mut states = Vec::new();
    for row in rows {
        let (referral_id, status, previous_status, deleted_by) = row?;
        let previous_status = previous_status.and_then(|raw| match ReferralStatus::from_str(&raw) {
            Ok(status) => Some(status),
            Err(_) => {
                tracing::warn!(dashboard_id = id, %referral_id, value = %raw, "Ignoring malformed previous status");
                None
            }
        });
        states.push(ReferralState {
            referral_id: parse_uuid("referral_states.referral_id", &referral_id)?,
            status: ReferralStatus::from_str(&status)?,
            previous_status,
            deleted_by: parse_optional_uuid("deleted_by", deleted_by)?,
        });
    }

    Ok(Dashboard {
        id: parse_uuid("dashboards.id", id)?,
        user_id: parse_uuid("dashboards.user_id", user_id)?,
        states,
    })
}

pub fn list_dashboard_ids(conn: &Connection) -> Result<Vec<Uuid>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT id FROM dashboards ORDER BY rowid ASC")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut ids = Vec::new();
    for raw in rows {
        ids.push(parse_uuid("dashboards.id", &raw?)?);
    }
    Ok(ids)
}

/// Add an initial-column state for `referral_id` to one dashboard.
/// Returns `false` when the dashboard already tracks the referral or the
/// referral no longer exists.
pub fn attach_referral_state(
    conn: &Connection,
    dashboard_id: &Uuid,
    referral_id: &Uuid,
) -> Result<bool, DatabaseError> {
    let inserted = conn.execute(
        "INSERT INTO referral_states (dashboard_id, referral_id, status)
         SELECT ?1, ?2, 'referral'
         WHERE EXISTS (SELECT 1 FROM referrals WHERE id = ?2)
         ON CONFLICT(dashboard_id, referral_id) DO NOTHING",
        params![dashboard_id.to_string(), referral_id.to_string()],
    )?;
    Ok(inserted > 0)
}

/// Remove the state for `referral_id` from one dashboard.
/// Returns `false` when there was nothing to remove.
pub fn detach_referral_state(
    conn: &Connection,
    dashboard_id: &Uuid,
    referral_id: &Uuid,
) -> Result<bool, DatabaseError> {
    let removed = conn.execute(
        "DELETE FROM referral_states WHERE dashboard_id = ?1 AND referral_id = ?2",
        params![dashboard_id.to_string(), referral_id.to_string()],
    )?;
    Ok(removed > 0)
}

/// Drop states of one dashboard whose referral is gone. Returns the count removed.
pub fn prune_dangling_states(conn: &Connection, dashboard_id: &Uuid) -> Result<usize, DatabaseError> {
    let removed = conn.execute(
        "DELETE FROM referral_states
         WHERE dashboard_id = ?1 AND referral_id NOT IN (SELECT id FROM referrals)",
        params![dashboard_id.to_string()],
    )?;
    Ok(removed)
}

/// Number of (dashboard, state) pairs per status across every dashboard.
/// States whose referral is gone are not counted.
pub fn count_states_by_status(conn: &Connection) -> Result<Vec<(ReferralStatus, u64)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM referral_states
         WHERE referral_id IN (SELECT id FROM referrals)
         GROUP BY status",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    let mut counts = Vec::new();
    for row in rows {
        let (status, count) = row?;
        counts.push((ReferralStatus::from_str(&status)?, count as u64));
    }
    Ok(counts)
}
