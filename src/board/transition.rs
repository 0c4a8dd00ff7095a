//! Transition Engine: legal moves of a referral state on one dashboard.
//!
//! `status` plus the single `previous_status` form a two-slot history:
//! soft delete pushes the current status into the slot, restore pops it
//! and leaves `deleted` behind, so delete/restore cycles stay well defined.
//! `deleted` is only entered through `soft_delete`.

use std::str::FromStr;

use uuid::Uuid;

use super::BoardError;
use crate::models::{Dashboard, ReferralState, ReferralStatus};

/// A validated `setStatus` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub referral_id: Uuid,
    pub status: ReferralStatus,
}

impl StatusChange {
    pub fn parse(referral_id: Option<&str>, new_status: Option<&str>) -> Result<Self, BoardError> {
        let referral_id = referral_id
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| BoardError::bad_request("referral_id is required"))?;
        let new_status = new_status
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| BoardError::bad_request("new_status is required"))?;

        let referral_id = Uuid::parse_str(referral_id)
            .map_err(|_| BoardError::bad_request(format!("Invalid referral id: {referral_id}")))?;
        let status = ReferralStatus::from_str(new_status)
            .map_err(|_| BoardError::bad_request(format!("Unknown status: {new_status}")))?;
        ensure_settable(status)?;
        Ok(Self {
            referral_id,
            status,
        })
    }
}

fn state_mut<'a>(dashboard: &'a mut Dashboard, referral_id: &Uuid) -> Result<&'a mut ReferralState, BoardError> {
    let dashboard_id = dashboard.id;
    dashboard.state_mut(referral_id).ok_or_else(|| BoardError::NotFound {
        entity: "referral state".into(),
        id: format!("{referral_id} on dashboard {dashboard_id}"),
    })
}

/// `deleted` is reachable only through `soft_delete`.
pub(crate) fn ensure_settable(status: ReferralStatus) -> Result<(), BoardError> {
    if status == ReferralStatus::Deleted {
        return Err(BoardError::bad_request(
            "Use the delete operation to move a referral to 'deleted'",
        ));
    }
    Ok(())
}

/// Jump directly to `change.status`. The state must already be tracked.
pub fn set_status(dashboard: &mut Dashboard, change: &StatusChange) -> Result<ReferralState, BoardError> {
    ensure_settable(change.status)?;
    let state = state_mut(dashboard, &change.referral_id)?;
    if state.status != change.status {
        state.previous_status = Some(state.status);
        state.status = change.status;
    }
    state.deleted_by = None;
    Ok(state.clone())
}

pub fn soft_delete(
    dashboard: &mut Dashboard,
    referral_id: &Uuid,
    actor_id: Uuid,
) -> Result<ReferralState, BoardError> {
    let state = state_mut(dashboard, referral_id)?;
    if state.status == ReferralStatus::Deleted {
        return Err(BoardError::bad_request("Referral is already deleted"));
    }
    state.previous_status = Some(state.status);
    state.status = ReferralStatus::Deleted;
    state.deleted_by = Some(actor_id);
    Ok(state.clone())
}

pub fn restore(dashboard: &mut Dashboard, referral_id: &Uuid) -> Result<ReferralState, BoardError> {
    let state = state_mut(dashboard, referral_id)?;
    if state.status != ReferralStatus::Deleted {
        return Err(BoardError::bad_request(format!(
            "Only deleted referrals can be restored (current status: {})",
            state.status
        )));
    }
    state.status = match state.previous_status {
        Some(prior) if prior != ReferralStatus::Deleted => prior,
        _ => ReferralStatus::Referral,
    };
    state.previous_status = Some(ReferralStatus::Deleted);
    state.deleted_by = None;
    Ok(state.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_with(state: ReferralState) -> Dashboard {
        Dashboard {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            states: vec![state],
        }
    }

    #[test]
    fn delete_then_restore_returns_to_prior_column() {
        let r1 = Uuid::new_v4();
        let actor = Uuid::new_v4();
        let mut dashboard = board_with(ReferralState {
            referral_id: r1,
            status: ReferralStatus::Todo,
            previous_status: Some(ReferralStatus::Referral),
            deleted_by: None,
        });

        let deleted = soft_delete(&mut dashboard, &r1, actor).unwrap();
        assert_eq!(deleted.status, ReferralStatus::Deleted);
        assert_eq!(deleted.previous_status, Some(ReferralStatus::Todo));
        assert_eq!(deleted.deleted_by, Some(actor));

        let restored = restore(&mut dashboard, &r1).unwrap();
        assert_eq!(restored.status, ReferralStatus::Todo);
        assert_eq!(restored.previous_status, Some(ReferralStatus::Deleted));
        assert_eq!(restored.deleted_by, None);
    }

    #[test]
    fn repeated_cycles_stay_well_defined() {
        let r1 = Uuid::new_v4();
        let mut dashboard = board_with(ReferralState::initial(r1));
        set_status(
            &mut dashboard,
            &StatusChange { referral_id: r1, status: ReferralStatus::Completed },
        )
        .unwrap();

        for _ in 0..3 {
            soft_delete(&mut dashboard, &r1, Uuid::new_v4()).unwrap();
            let restored = restore(&mut dashboard, &r1).unwrap();
            assert_eq!(restored.status, ReferralStatus::Completed);
        }
    }

    #[test]
    fn restore_without_usable_prior_falls_back_to_referral() {
        let r1 = Uuid::new_v4();
        for prior in [None, Some(ReferralStatus::Deleted)] {
            let mut dashboard = board_with(ReferralState {
                referral_id: r1,
                status: ReferralStatus::Deleted,
                previous_status: prior,
                deleted_by: Some(Uuid::new_v4()),
            });
            assert_eq!(restore(&mut dashboard, &r1).unwrap().status, ReferralStatus::Referral);
        }
    }

    #[test]
    fn restore_of_live_state_is_bad_request() {
        let r1 = Uuid::new_v4();
        let mut dashboard = board_with(ReferralState::initial(r1));
        assert!(matches!(restore(&mut dashboard, &r1), Err(BoardError::BadRequest(_))));
        assert_eq!(dashboard.states[0], ReferralState::initial(r1));
    }

    #[test]
    fn missing_state_is_not_found() {
        let mut dashboard = board_with(ReferralState::initial(Uuid::new_v4()));
        let other = Uuid::new_v4();
        assert!(matches!(restore(&mut dashboard, &other), Err(BoardError::NotFound { .. })));
        assert!(matches!(
            soft_delete(&mut dashboard, &other, Uuid::new_v4()),
            Err(BoardError::NotFound { .. })
        ));
        assert!(matches!(
            set_status(&mut dashboard, &StatusChange { referral_id: other, status: ReferralStatus::Todo }),
            Err(BoardError::NotFound { .. })
        ));
    }

    #[test]
    fn double_delete_is_rejected() {
        let r1 = Uuid::new_v4();
        let mut dashboard = board_with(ReferralState::initial(r1));
        soft_delete(&mut dashboard, &r1, Uuid::new_v4()).unwrap();
        assert!(matches!(
            soft_delete(&mut dashboard, &r1, Uuid::new_v4()),
            Err(BoardError::BadRequest(_))
        ));
        assert_eq!(dashboard.states[0].previous_status, Some(ReferralStatus::Referral));
    }

    #[test]
    fn set_status_jumps_and_records_prior() {
        let r1 = Uuid::new_v4();
        let mut dashboard = board_with(ReferralState::initial(r1));

        let state = set_status(
            &mut dashboard,
            &StatusChange { referral_id: r1, status: ReferralStatus::Cancelled },
        )
        .unwrap();
        assert_eq!(state.status, ReferralStatus::Cancelled);
        assert_eq!(state.previous_status, Some(ReferralStatus::Referral));

        // Same status again keeps history as is.
        let again = set_status(
            &mut dashboard,
            &StatusChange { referral_id: r1, status: ReferralStatus::Cancelled },
        )
        .unwrap();
        assert_eq!(again.previous_status, Some(ReferralStatus::Referral));
    }

    #[test]
    fn set_status_cannot_enter_deleted() {
        let r1 = Uuid::new_v4();
        let mut dashboard = board_with(ReferralState::initial(r1));
        assert!(matches!(
            set_status(&mut dashboard, &StatusChange { referral_id: r1, status: ReferralStatus::Deleted }),
            Err(BoardError::BadRequest(_))
        ));
    }

    #[test]
    fn set_status_out_of_deleted_clears_deleter() {
        let r1 = Uuid::new_v4();
        let mut dashboard = board_with(ReferralState::initial(r1));
        soft_delete(&mut dashboard, &r1, Uuid::new_v4()).unwrap();
        let state = set_status(
            &mut dashboard,
            &StatusChange { referral_id: r1, status: ReferralStatus::Todo },
        )
        .unwrap();
        assert_eq!(state.deleted_by, None);
        assert_eq!(state.previous_status, Some(ReferralStatus::Deleted));
    }

    #[test]
    fn parse_rejects_missing_and_malformed_input() {
        let id = Uuid::new_v4().to_string();
        assert!(StatusChange::parse(None, Some("todo")).is_err());
        assert!(StatusChange::parse(Some(&id), None).is_err());
        assert!(StatusChange::parse(Some("  "), Some("todo")).is_err());
        assert!(StatusChange::parse(Some("not-a-uuid"), Some("todo")).is_err());
        assert!(StatusChange::parse(Some(&id), Some("archived")).is_err());
        assert!(matches!(
            StatusChange::parse(Some(&id), Some("deleted")),
            Err(BoardError::BadRequest(_))
        ));

        let change = StatusChange::parse(Some(&id), Some(" completed ")).unwrap();
        assert_eq!(change.status, ReferralStatus::Completed);
        assert_eq!(change.referral_id.to_string(), id);
    }
}
