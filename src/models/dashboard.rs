use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ReferralStatus;

/// One user's board: their own view of every shared referral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Insertion-ordered, at most one entry per referral id.
    pub states: Vec<ReferralState>,
}

/// A referral's position on a dashboard, with a two-slot history
/// (`status` plus the single `previous_status`) for one-level restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralState {
    pub referral_id: Uuid,
    pub status: ReferralStatus,
    pub previous_status: Option<ReferralStatus>,
    /// Set only while `status` is `deleted`.
    pub deleted_by: Option<Uuid>,
}

impl ReferralState {
    /// Fresh entry in the initial column.
    pub fn initial(referral_id: Uuid) -> Self {
        Self {
            referral_id,
            status: ReferralStatus::Referral,
            previous_status: None,
            deleted_by: None,
        }
    }
}

impl Dashboard {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            states: Vec::new(),
        }
    }

    pub fn contains(&self, referral_id: &Uuid) -> bool {
        self.states.iter().any(|s| &s.referral_id == referral_id)
    }

    pub fn state(&self, referral_id: &Uuid) -> Option<&ReferralState> {
        self.states.iter().find(|s| &s.referral_id == referral_id)
    }

    pub fn state_mut(&mut self, referral_id: &Uuid) -> Option<&mut ReferralState> {
        self.states.iter_mut().find(|s| &s.referral_id == referral_id)
    }

    /// Append an initial-column entry unless the referral is already tracked.
    /// Returns whether an entry was added.
    pub fn track(&mut self, referral_id: Uuid) -> bool {
        if self.contains(&referral_id) {
            return false;
        }
        self.states.push(ReferralState::initial(referral_id));
        true
    }
}
