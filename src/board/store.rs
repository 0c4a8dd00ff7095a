//! Dashboard Store: one dashboard per user, created on first access.

use rusqlite::Connection;
use uuid::Uuid;

use super::BoardError;
use crate::db::repository;
use crate::models::Dashboard;

/// Load the user's dashboard, creating it with one initial-column state per
/// existing referral when absent. Run inside a transaction.
pub fn get_or_create(conn: &Connection, user_id: &Uuid) -> Result<Dashboard, BoardError> {
    if let Some(dashboard) = repository::get_dashboard_by_user(conn, user_id)? {
        return Ok(dashboard);
    }

    let mut dashboard = Dashboard::new(*user_id);
    for referral_id in repository::list_referral_ids(conn)? {
        dashboard.track(referral_id);
    }
    repository::insert_dashboard(conn, &dashboard)?;
    tracing::info!(
        %user_id,
        dashboard_id = %dashboard.id,
        states = dashboard.states.len(),
        "Dashboard created"
    );
    Ok(dashboard)
}

/// Admin variant of [`get_or_create`]: the target user must already be known.
pub fn get_or_create_by_id(conn: &Connection, user_id: &Uuid) -> Result<Dashboard, BoardError> {
    if !repository::user_exists(conn, user_id)? {
        return Err(BoardError::not_found("user", user_id));
    }
    get_or_create(conn, user_id)
}

pub fn get(conn: &Connection, dashboard_id: &Uuid) -> Result<Dashboard, BoardError> {
    repository::get_dashboard(conn, dashboard_id)?
        .ok_or_else(|| BoardError::not_found("dashboard", dashboard_id))
}

/// Idempotent upsert keyed by dashboard id.
pub fn save(conn: &Connection, dashboard: &Dashboard) -> Result<(), BoardError> {
    repository::save_dashboard(conn, dashboard)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::{insert_sample_user, sample_referral};
    use crate::db::sqlite::open_memory_database;
    use crate::models::{ReferralState, ReferralStatus, UserRole};

    #[test]
    fn first_access_tracks_every_existing_referral() {
        let conn = open_memory_database().unwrap();
        let user = insert_sample_user(&conn, UserRole::User);
        let r1 = sample_referral(user.id);
        let r2 = sample_referral(user.id);
        repository::insert_referral(&conn, &r1).unwrap();
        repository::insert_referral(&conn, &r2).unwrap();

        let dashboard = get_or_create(&conn, &user.id).unwrap();
        assert_eq!(
            dashboard.states,
            vec![ReferralState::initial(r1.id), ReferralState::initial(r2.id)]
        );
        assert!(dashboard.states.iter().all(|s| s.previous_status.is_none()));
    }

    #[test]
    fn second_access_returns_same_dashboard() {
        let conn = open_memory_database().unwrap();
        let user = insert_sample_user(&conn, UserRole::User);
        let first = get_or_create(&conn, &user.id).unwrap();
        let second = get_or_create(&conn, &user.id).unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn by_id_requires_known_user() {
        let conn = open_memory_database().unwrap();
        assert!(matches!(
            get_or_create_by_id(&conn, &Uuid::new_v4()),
            Err(BoardError::NotFound { entity, .. }) if entity == "user"
        ));

        let user = insert_sample_user(&conn, UserRole::Staff);
        assert_eq!(get_or_create_by_id(&conn, &user.id).unwrap().user_id, user.id);
    }

    #[test]
    fn save_round_trips_through_get() {
        let conn = open_memory_database().unwrap();
        let user = insert_sample_user(&conn, UserRole::User);
        let mut dashboard = get_or_create(&conn, &user.id).unwrap();
        let referral = Uuid::new_v4();
        dashboard.track(referral);
        dashboard.state_mut(&referral).unwrap().status = ReferralStatus::Cancelled;

        save(&conn, &dashboard).unwrap();
        save(&conn, &dashboard).unwrap();
        assert_eq!(get(&conn, &dashboard.id).unwrap(), dashboard);
    }

    #[test]
    fn unknown_dashboard_is_not_found() {
        let conn = open_memory_database().unwrap();
        assert!(matches!(
            get(&conn, &Uuid::new_v4()),
            Err(BoardError::NotFound { .. })
        ));
    }
}
