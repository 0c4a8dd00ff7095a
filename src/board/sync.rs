//! Sync Engine: reconcile dashboards against the referral set.
//!
//! Two halves:
//! - `partition` / `reconcile`: per-dashboard read path with lazy backfill.
//! - `broadcast`: create/delete cascade fanned out over every dashboard,
//!   one bounded blocking task per dashboard, failures isolated and reported.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::future::join_all;
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use super::BoardError;
use crate::core_state::CoreState;
use crate::db::repository;
use crate::models::*;

// ═══════════════════════════════════════════════════════════
// Column partition
// ═══════════════════════════════════════════════════════════

/// A live referral annotated with one dashboard's view of it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferralWithState {
    #[serde(flatten)]
    pub referral: Referral,
    pub status: ReferralStatus,
    pub previous_status: Option<ReferralStatus>,
    pub deleted_by: Option<Uuid>,
}

impl ReferralWithState {
    pub fn new(referral: Referral, state: &ReferralState) -> Self {
        Self {
            referral,
            status: state.status,
            previous_status: state.previous_status,
            deleted_by: state.deleted_by,
        }
    }
}

/// Referrals grouped by status for one dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnPartition {
    pub dashboard_id: Uuid,
    pub user_id: Uuid,
    pub referral: Vec<ReferralWithState>,
    pub todo: Vec<ReferralWithState>,
    pub completed: Vec<ReferralWithState>,
    pub cancelled: Vec<ReferralWithState>,
    pub deleted: Vec<ReferralWithState>,
}

impl ColumnPartition {
    fn empty(dashboard: &Dashboard) -> Self {
        Self {
            dashboard_id: dashboard.id,
            user_id: dashboard.user_id,
            ..Default::default()
        }
    }

    pub fn column(&self, status: ReferralStatus) -> &[ReferralWithState] {
        match status {
            ReferralStatus::Referral => &self.referral,
            ReferralStatus::Todo => &self.todo,
            ReferralStatus::Completed => &self.completed,
            ReferralStatus::Cancelled => &self.cancelled,
            ReferralStatus::Deleted => &self.deleted,
        }
    }

    fn column_mut(&mut self, status: ReferralStatus) -> &mut Vec<ReferralWithState> {
        match status {
            ReferralStatus::Referral => &mut self.referral,
            ReferralStatus::Todo => &mut self.todo,
            ReferralStatus::Completed => &mut self.completed,
            ReferralStatus::Cancelled => &mut self.cancelled,
            ReferralStatus::Deleted => &mut self.deleted,
        }
    }

    /// Entries across all columns.
    pub fn len(&self) -> usize {
        ReferralStatus::ALL.iter().map(|s| self.column(*s).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Group `dashboard` into columns against the live `referrals`.
///
/// States whose referral no longer exists are dropped. Referrals the
/// dashboard does not track yet land in the `referral` column and are
/// returned as backfill states for the caller to persist.
pub fn partition(
    dashboard: &Dashboard,
    referrals: &[Referral],
) -> (ColumnPartition, Vec<ReferralState>) {
    let live: HashMap<Uuid, &Referral> = referrals.iter().map(|r| (r.id, r)).collect();
    let tracked: HashSet<Uuid> = dashboard.states.iter().map(|s| s.referral_id).collect();
    let mut columns = ColumnPartition::empty(dashboard);

    for state in &dashboard.states {
        match live.get(&state.referral_id) {
            Some(referral) => columns
                .column_mut(state.status)
                .push(ReferralWithState::new((*referral).clone(), state)),
            None => tracing::debug!(
                dashboard_id = %dashboard.id,
                referral_id = %state.referral_id,
                "Dropping dangling state"
            ),
        }
    }

    let mut backfill = Vec::new();
    for referral in referrals.iter().filter(|r| !tracked.contains(&r.id)) {
        let state = ReferralState::initial(referral.id);
        columns
            .referral
            .push(ReferralWithState::new(referral.clone(), &state));
        backfill.push(state);
    }

    (columns, backfill)
}

/// Partition `dashboard` against every stored referral, delete dangling
/// states and persist any backfilled ones. Run inside the transaction that
/// loaded `dashboard`.
pub fn reconcile(conn: &Connection, dashboard: &mut Dashboard) -> Result<ColumnPartition, BoardError> {
    let referrals = repository::list_referrals(conn, &ReferralFilter::default())?;
    let (columns, backfill) = partition(dashboard, &referrals);

    let live: HashSet<Uuid> = referrals.iter().map(|r| r.id).collect();
    if dashboard.states.iter().any(|s| !live.contains(&s.referral_id)) {
        dashboard.states.retain(|s| live.contains(&s.referral_id));
        let pruned = repository::prune_dangling_states(conn, &dashboard.id)?;
        tracing::debug!(dashboard_id = %dashboard.id, pruned, "Pruned dangling states");
    }
    if !backfill.is_empty() {
        tracing::debug!(dashboard_id = %dashboard.id, count = backfill.len(), "Backfilling states");
        dashboard.states.extend(backfill);
        repository::save_dashboard(conn, dashboard)?;
    }
    Ok(columns)
}

// ═══════════════════════════════════════════════════════════
// Broadcast cascade
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "referral_id", rename_all = "lowercase")]
pub enum CascadeOp {
    /// Track a newly created referral in the initial column.
    Attach(Uuid),
    /// Drop a deleted referral's state.
    Detach(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeFailure {
    pub dashboard_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub op: CascadeOp,
    /// Dashboards whose states changed.
    pub updated: usize,
    /// Dashboards already in the target shape.
    pub unchanged: usize,
    pub failed: Vec<CascadeFailure>,
}

impl CascadeReport {
    fn new(op: CascadeOp) -> Self {
        Self {
            op,
            updated: 0,
            unchanged: 0,
            failed: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// One human-readable line per dashboard that was not updated.
    pub fn warnings(&self) -> Vec<String> {
        self.failed
            .iter()
            .map(|f| format!("Dashboard {} was not updated: {}", f.dashboard_id, f.reason))
            .collect()
    }
}

fn apply(core: &CoreState, op: CascadeOp, dashboard_id: &Uuid) -> Result<bool, BoardError> {
    let conn = core.open_db()?;
    let changed = match op {
        CascadeOp::Attach(referral_id) => {
            repository::attach_referral_state(&conn, dashboard_id, &referral_id)?
        }
        CascadeOp::Detach(referral_id) => {
            repository::detach_referral_state(&conn, dashboard_id, &referral_id)?
        }
    };
    Ok(changed)
}

/// Apply `op` to every dashboard currently stored.
pub async fn broadcast(core: Arc<CoreState>, op: CascadeOp) -> Result<CascadeReport, BoardError> {
    let lister = core.clone();
    let dashboard_ids = tokio::task::spawn_blocking(move || -> Result<Vec<Uuid>, BoardError> {
        let conn = lister.open_db()?;
        Ok(repository::list_dashboard_ids(&conn)?)
    })
    .await
    .map_err(|e| BoardError::Task(e.to_string()))??;

    Ok(broadcast_to(core, op, dashboard_ids).await)
}

/// Apply `op` to each listed dashboard independently. At most
/// `cascade_concurrency` updates run at once; a failing dashboard is
/// recorded in the report and never stops the others.
pub async fn broadcast_to(
    core: Arc<CoreState>,
    op: CascadeOp,
    dashboard_ids: Vec<Uuid>,
) -> CascadeReport {
    let permits = core.cascade_permits();

    let tasks = dashboard_ids.into_iter().map(|dashboard_id| {
        let core = core.clone();
        let permits = permits.clone();
        async move {
            let outcome = match permits.acquire_owned().await {
                Ok(permit) => tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    apply(&core, op, &dashboard_id)
                })
                .await
                .unwrap_or_else(|e| Err(BoardError::Task(e.to_string()))),
                Err(e) => Err(BoardError::Task(e.to_string())),
            };
            (dashboard_id, outcome)
        }
    });

    let mut report = CascadeReport::new(op);
    for (dashboard_id, outcome) in join_all(tasks).await {
        match outcome {
            Ok(true) => report.updated += 1,
            Ok(false) => report.unchanged += 1,
            Err(e) => {
                tracing::warn!(%dashboard_id, error = %e, ?op, "Cascade update failed");
                report.failed.push(CascadeFailure {
                    dashboard_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        ?op,
        updated = report.updated,
        unchanged = report.unchanged,
        failed = report.failed.len(),
        "Cascade finished"
    );
    report
}
