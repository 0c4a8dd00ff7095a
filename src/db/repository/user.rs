use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

/// Record an actor. Role and last-seen time always follow the identity
/// context; name and email are only overwritten when supplied.
pub fn upsert_user(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, display_name, email, role, created_at, last_seen_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
            display_name = COALESCE(excluded.display_name, users.display_name),
            email = COALESCE(excluded.email, users.email),
            role = excluded.role,
            last_seen_at = excluded.last_seen_at",
        params![
            user.id.to_string(),
            user.display_name,
            user.email,
            user.role.as_str(),
            format_datetime(&user.created_at),
            format_datetime(&user.last_seen_at),
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &Uuid) -> Result<Option<User>, DatabaseError> {
    conn.query_row(
        "SELECT id, display_name, email, role, created_at, last_seen_at FROM users WHERE id = ?1",
        params![id.to_string()],
        user_row,
    )
    .optional()?
    .map(into_user)
    .transpose()
}

pub fn user_exists(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM users WHERE id = ?1",
            params![id.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn list_users(conn: &Connection, filter: &UserFilter) -> Result<Vec<User>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, display_name, email, role, created_at, last_seen_at FROM users
         WHERE (?1 IS NULL OR role = ?1)
         ORDER BY created_at ASC, rowid ASC",
    )?;
    let rows = stmt.query_map(params![filter.role.map(|r| r.as_str())], user_row)?;
    let mut users = Vec::new();
    for row in rows {
        users.push(into_user(row?)?);
    }
    Ok(users)
}

/// Delete a user; their dashboard and its states cascade away.
pub fn delete_user(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let changed = conn.execute("DELETE FROM users WHERE id = ?1", params![id.to_string()])?;
    if changed == 0 {
        return Err(DatabaseError::not_found("user", id));
    }
    Ok(())
}

type UserRow = (String, Option<String>, Option<String>, String, String, String);

fn user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn into_user(
    (id, display_name, email, role, created_at, last_seen_at): UserRow,
) -> Result<User, DatabaseError> {
    Ok(User {
        id: parse_uuid("users.id", &id)?,
        display_name,
        email,
        role: UserRole::from_str(&role)?,
        created_at: parse_datetime("created_at", &created_at)?,
        last_seen_at: parse_datetime("last_seen_at", &last_seen_at)?,
    })
}
