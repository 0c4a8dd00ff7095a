//! User directory: actors seen through the identity context.

use rusqlite::Connection;
use uuid::Uuid;

use super::BoardError;
use crate::db::repository::{self, now};
use crate::models::{User, UserFilter, UserRole};

/// Identity fields forwarded by the gateway for one request.
#[derive(Debug, Clone)]
pub struct ActorProfile {
    pub user_id: Uuid,
    pub role: UserRole,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

/// Upsert the actor and refresh its last-seen time.
pub fn record_actor(conn: &Connection, profile: &ActorProfile) -> Result<(), BoardError> {
    let seen = now();
    repository::upsert_user(
        conn,
        &User {
            id: profile.user_id,
            display_name: profile.display_name.clone(),
            email: profile.email.clone(),
            role: profile.role,
            created_at: seen,
            last_seen_at: seen,
        },
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &Uuid) -> Result<User, BoardError> {
    repository::get_user(conn, id)?.ok_or_else(|| BoardError::not_found("user", id))
}

pub fn list(conn: &Connection, filter: &UserFilter) -> Result<Vec<User>, BoardError> {
    Ok(repository::list_users(conn, filter)?)
}

/// Remove a user. Their dashboard goes with them.
pub fn delete(conn: &Connection, id: &Uuid) -> Result<(), BoardError> {
    repository::delete_user(conn, id)?;
    tracing::info!(user_id = %id, "User deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::store;
    use crate::db::sqlite::open_memory_database;

    fn profile(role: UserRole) -> ActorProfile {
        ActorProfile {
            user_id: Uuid::new_v4(),
            role,
            display_name: Some("Anita".into()),
            email: None,
        }
    }

    #[test]
    fn recorded_actor_is_listed() {
        let conn = open_memory_database().unwrap();
        let staff = profile(UserRole::Staff);
        record_actor(&conn, &staff).unwrap();
        record_actor(&conn, &profile(UserRole::User)).unwrap();

        let found = get(&conn, &staff.user_id).unwrap();
        assert_eq!(found.role, UserRole::Staff);
        assert_eq!(found.display_name.as_deref(), Some("Anita"));
        let only_staff = list(&conn, &UserFilter { role: Some(UserRole::Staff) }).unwrap();
        assert_eq!(only_staff.len(), 1);
    }

    #[test]
    fn deleting_user_removes_dashboard() {
        let conn = open_memory_database().unwrap();
        let user = profile(UserRole::User);
        record_actor(&conn, &user).unwrap();
        let dashboard = store::get_or_create(&conn, &user.user_id).unwrap();

        delete(&conn, &user.user_id).unwrap();
        assert!(matches!(get(&conn, &user.user_id), Err(BoardError::NotFound { .. })));
        assert!(matches!(store::get(&conn, &dashboard.id), Err(BoardError::NotFound { .. })));
        assert!(matches!(delete(&conn, &user.user_id), Err(BoardError::NotFound { .. })));
    }
}
