use rusqlite::Connection;
use serde::Serialize;

use super::BoardError;
use crate::db::repository;
use crate::models::ReferralStatus;

/// Count of (dashboard, state) pairs per status across every dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub referral: u64,
    pub todo: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub deleted: u64,
}

impl StatusSummary {
    fn slot(&mut self, status: ReferralStatus) -> &mut u64 {
        match status {
            ReferralStatus::Referral => &mut self.referral,
            ReferralStatus::Todo => &mut self.todo,
            ReferralStatus::Completed => &mut self.completed,
            ReferralStatus::Cancelled => &mut self.cancelled,
            ReferralStatus::Deleted => &mut self.deleted,
        }
    }

    pub fn total(&self) -> u64 {
        self.referral + self.todo + self.completed + self.cancelled + self.deleted
    }
}

pub fn admin_summary(conn: &Connection) -> Result<StatusSummary, BoardError> {
    let mut summary = StatusSummary::default();
    for (status, count) in repository::count_states_by_status(conn)? {
        *summary.slot(status) += count;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::{insert_sample_user, sample_referral};
    use crate::db::sqlite::open_memory_database;
    use crate::models::{Dashboard, UserRole};
    use uuid::Uuid;

    fn stored_referral(conn: &rusqlite::Connection) -> Uuid {
        let author = insert_sample_user(conn, UserRole::Staff);
        let referral = sample_referral(author.id);
        repository::insert_referral(conn, &referral).unwrap();
        referral.id
    }

    #[test]
    fn counts_sum_to_all_states() {
        let conn = open_memory_database().unwrap();
        let shared = stored_referral(&conn);
        for status in [ReferralStatus::Todo, ReferralStatus::Deleted, ReferralStatus::Todo] {
            let user = insert_sample_user(&conn, UserRole::User);
            let mut dashboard = Dashboard::new(user.id);
            dashboard.track(shared);
            dashboard.track(stored_referral(&conn));
            dashboard.state_mut(&shared).unwrap().status = status;
            repository::insert_dashboard(&conn, &dashboard).unwrap();
        }

        let summary = admin_summary(&conn).unwrap();
        assert_eq!(summary.todo, 2);
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.referral, 3);
        assert_eq!(summary.total(), 6);
    }

    #[test]
    fn states_of_deleted_referrals_are_not_counted() {
        let conn = open_memory_database().unwrap();
        let gone = stored_referral(&conn);
        let user = insert_sample_user(&conn, UserRole::User);
        let mut dashboard = Dashboard::new(user.id);
        dashboard.track(gone);
        dashboard.track(stored_referral(&conn));
        repository::insert_dashboard(&conn, &dashboard).unwrap();
        repository::delete_referral(&conn, &gone).unwrap();

        assert_eq!(admin_summary(&conn).unwrap().total(), 1);
    }

    #[test]
    fn empty_store_reports_every_status() {
        let conn = open_memory_database().unwrap();
        let json = serde_json::to_value(admin_summary(&conn).unwrap()).unwrap();
        for status in ReferralStatus::ALL {
            assert_eq!(json[status.as_str()], 0);
        }
    }
}
