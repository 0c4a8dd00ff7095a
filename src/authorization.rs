//! Role-based authorization gate.
//!
//! Every guarded action is a `Capability`. Handlers check the actor's role
//! against the capability table before any board operation runs; the board
//! itself never branches on role.
//!
//! Rules, checked in order:
//! 1. Acting on your own dashboard → own-dashboard capability
//! 2. Acting on someone else's dashboard → any-dashboard capability
//! 3. Everything else → role table lookup
//! 4. Default → DENY

use uuid::Uuid;

use crate::models::UserRole;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ViewOwnDashboard,
    EditOwnDashboard,
    ListReferrals,
    ViewOwnProfile,
    /// Create, update and delete referrals.
    ManageReferrals,
    ViewAnyDashboard,
    EditAnyDashboard,
    ViewSummary,
    ManageUsers,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ViewOwnDashboard => "view_own_dashboard",
            Self::EditOwnDashboard => "edit_own_dashboard",
            Self::ListReferrals => "list_referrals",
            Self::ViewOwnProfile => "view_own_profile",
            Self::ManageReferrals => "manage_referrals",
            Self::ViewAnyDashboard => "view_any_dashboard",
            Self::EditAnyDashboard => "edit_any_dashboard",
            Self::ViewSummary => "view_summary",
            Self::ManageUsers => "manage_users",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verified identity of the caller, supplied by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorContext {
    pub user_id: Uuid,
    pub role: UserRole,
}

/// Why access was granted (or denied), for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessReason {
    OwnDashboard,
    AnyDashboard,
    RoleGrant,
    Denied,
}

#[derive(Debug, Clone, Copy)]
pub struct AccessDecision {
    pub allowed: bool,
    pub capability: Capability,
    pub reason: AccessReason,
}

impl AccessDecision {
    fn decide(role: UserRole, capability: Capability, reason: AccessReason) -> Self {
        if permits(role, capability) {
            Self {
                allowed: true,
                capability,
                reason,
            }
        } else {
            Self {
                allowed: false,
                capability,
                reason: AccessReason::Denied,
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Error type
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum AuthorizationError {
    #[error("Role '{role}' lacks capability '{capability}'")]
    Forbidden {
        role: UserRole,
        capability: Capability,
    },
}

// ═══════════════════════════════════════════════════════════
// Capability table
// ═══════════════════════════════════════════════════════════

/// Whether `role` holds `capability`.
pub fn permits(role: UserRole, capability: Capability) -> bool {
    use Capability::*;
    match role {
        UserRole::Superadmin => true,
        UserRole::Admin => matches!(
            capability,
            ViewOwnDashboard
                | EditOwnDashboard
                | ListReferrals
                | ViewOwnProfile
                | ViewAnyDashboard
                | EditAnyDashboard
                | ViewSummary
                | ManageUsers
        ),
        UserRole::Staff => matches!(
            capability,
            ViewOwnDashboard | EditOwnDashboard | ListReferrals | ViewOwnProfile | ManageReferrals
        ),
        UserRole::User => matches!(
            capability,
            ViewOwnDashboard | EditOwnDashboard | ListReferrals | ViewOwnProfile
        ),
    }
}

// ═══════════════════════════════════════════════════════════
// Checks
// ═══════════════════════════════════════════════════════════

pub fn check(actor: &ActorContext, capability: Capability) -> AccessDecision {
    AccessDecision::decide(actor.role, capability, AccessReason::RoleGrant)
}

/// Editing a dashboard: owners need `EditOwnDashboard`, anyone else
/// needs `EditAnyDashboard`.
pub fn check_dashboard_edit(actor: &ActorContext, owner_id: &Uuid) -> AccessDecision {
    if &actor.user_id == owner_id {
        AccessDecision::decide(actor.role, Capability::EditOwnDashboard, AccessReason::OwnDashboard)
    } else {
        AccessDecision::decide(actor.role, Capability::EditAnyDashboard, AccessReason::AnyDashboard)
    }
}

pub fn authorize(actor: &ActorContext, capability: Capability) -> Result<(), AuthorizationError> {
    into_result(actor, check(actor, capability))
}

pub fn authorize_dashboard_edit(
    actor: &ActorContext,
    owner_id: &Uuid,
) -> Result<(), AuthorizationError> {
    into_result(actor, check_dashboard_edit(actor, owner_id))
}

fn into_result(actor: &ActorContext, decision: AccessDecision) -> Result<(), AuthorizationError> {
    if decision.allowed {
        return Ok(());
    }
    tracing::warn!(
        actor = %actor.user_id,
        role = %actor.role,
        capability = %decision.capability,
        "Access denied"
    );
    Err(AuthorizationError::Forbidden {
        role: actor.role,
        capability: decision.capability,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: UserRole) -> ActorContext {
        ActorContext {
            user_id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn every_role_can_work_its_own_dashboard() {
        for role in UserRole::ALL {
            assert!(permits(*role, Capability::ViewOwnDashboard));
            assert!(permits(*role, Capability::EditOwnDashboard));
            assert!(permits(*role, Capability::ListReferrals));
        }
    }

    #[test]
    fn only_staff_and_superadmin_manage_referrals() {
        assert!(permits(UserRole::Staff, Capability::ManageReferrals));
        assert!(permits(UserRole::Superadmin, Capability::ManageReferrals));
        assert!(!permits(UserRole::Admin, Capability::ManageReferrals));
        assert!(!permits(UserRole::User, Capability::ManageReferrals));
    }

    #[test]
    fn summary_and_foreign_dashboards_are_admin_only() {
        for cap in [Capability::ViewSummary, Capability::ViewAnyDashboard, Capability::EditAnyDashboard] {
            assert!(permits(UserRole::Admin, cap));
            assert!(permits(UserRole::Superadmin, cap));
            assert!(!permits(UserRole::Staff, cap));
            assert!(!permits(UserRole::User, cap));
        }
    }

    #[test]
    fn editing_someone_elses_dashboard_needs_admin() {
        let user = actor(UserRole::User);
        let other = Uuid::new_v4();

        let own = check_dashboard_edit(&user, &user.user_id);
        assert!(own.allowed);
        assert_eq!(own.reason, AccessReason::OwnDashboard);

        let foreign = check_dashboard_edit(&user, &other);
        assert!(!foreign.allowed);
        assert_eq!(foreign.reason, AccessReason::Denied);
        assert_eq!(foreign.capability, Capability::EditAnyDashboard);

        assert!(authorize_dashboard_edit(&actor(UserRole::Admin), &other).is_ok());
    }

    #[test]
    fn any_role_restores_on_its_own_dashboard() {
        for role in UserRole::ALL {
            let owner = actor(*role);
            assert!(authorize_dashboard_edit(&owner, &owner.user_id).is_ok());
        }
        let staff = actor(UserRole::Staff);
        assert!(authorize_dashboard_edit(&staff, &Uuid::new_v4()).is_err());
    }

    #[test]
    fn forbidden_names_role_and_capability() {
        let err = authorize(&actor(UserRole::User), Capability::ViewSummary).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Role 'user' lacks capability 'view_summary'"
        );
    }
}
