//! The referral board core.
//!
//! Each single-dashboard operation opens its own connection and runs as one
//! IMMEDIATE transaction (read, modify, write). Referral creation and global
//! deletion are followed by a broadcast cascade over every dashboard; a
//! partial cascade is reported, never rolled back.
//!
//! Callers pass the authorization gate before reaching this module.

pub mod error;
pub mod referrals;
pub mod store;
pub mod summary;
pub mod sync;
pub mod transition;
pub mod users;

use std::sync::Arc;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use uuid::Uuid;

pub use error::BoardError;
pub use referrals::{UpdateOutcome, UploadPolicy};
pub use summary::StatusSummary;
pub use sync::{CascadeFailure, CascadeOp, CascadeReport, ColumnPartition, ReferralWithState};
pub use transition::StatusChange;
pub use users::ActorProfile;

use crate::core_state::CoreState;
use crate::db::repository;
use crate::models::*;
use crate::storage::FileUpload;

/// Result of an operation followed by a cascade. `warnings` names every
/// dashboard that was not brought up to date.
#[derive(Debug)]
pub struct Cascaded<T> {
    pub value: T,
    pub report: Option<CascadeReport>,
    pub warnings: Vec<String>,
}

fn immediate(conn: &mut Connection) -> Result<Transaction<'_>, BoardError> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

async fn blocking<T, F>(f: F) -> Result<T, BoardError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, BoardError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BoardError::Task(e.to_string()))?
}

async fn cascade(core: Arc<CoreState>, op: CascadeOp, mut warnings: Vec<String>) -> (Option<CascadeReport>, Vec<String>) {
    match sync::broadcast(core, op).await {
        Ok(report) => {
            warnings.extend(report.warnings());
            (Some(report), warnings)
        }
        Err(e) => {
            tracing::warn!(?op, error = %e, "Cascade could not enumerate dashboards");
            warnings.push(format!("Dashboards were not updated: {e}"));
            (None, warnings)
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Dashboards
// ═══════════════════════════════════════════════════════════

/// The actor's own dashboard, created and backfilled as needed.
pub fn get_dashboard(core: &CoreState, actor_id: &Uuid) -> Result<ColumnPartition, BoardError> {
    let mut conn = core.open_db()?;
    let tx = immediate(&mut conn)?;
    let mut dashboard = store::get_or_create(&tx, actor_id)?;
    let columns = sync::reconcile(&tx, &mut dashboard)?;
    tx.commit()?;
    Ok(columns)
}

/// Another user's dashboard. Fails `NotFound` for unknown users.
pub fn get_dashboard_for_user(core: &CoreState, target_user_id: &Uuid) -> Result<ColumnPartition, BoardError> {
    let mut conn = core.open_db()?;
    let tx = immediate(&mut conn)?;
    let mut dashboard = store::get_or_create_by_id(&tx, target_user_id)?;
    let columns = sync::reconcile(&tx, &mut dashboard)?;
    tx.commit()?;
    Ok(columns)
}

fn apply_status_change(tx: &Transaction<'_>, mut dashboard: Dashboard, change: &StatusChange) -> Result<Dashboard, BoardError> {
    transition::ensure_settable(change.status)?;
    if !dashboard.contains(&change.referral_id) {
        if !repository::referral_exists(tx, &change.referral_id)? {
            return Err(BoardError::not_found("referral", change.referral_id));
        }
        dashboard.track(change.referral_id);
    }
    transition::set_status(&mut dashboard, change)?;
    store::save(tx, &dashboard)?;
    Ok(dashboard)
}

pub fn set_referral_status(core: &CoreState, actor_id: &Uuid, change: &StatusChange) -> Result<Dashboard, BoardError> {
    let mut conn = core.open_db()?;
    let tx = immediate(&mut conn)?;
    let dashboard = store::get_or_create(&tx, actor_id)?;
    let dashboard = apply_status_change(&tx, dashboard, change)?;
    tx.commit()?;
    tracing::info!(dashboard_id = %dashboard.id, referral_id = %change.referral_id, status = %change.status, "Status changed");
    Ok(dashboard)
}

pub fn set_referral_status_for_user(
    core: &CoreState,
    target_user_id: &Uuid,
    change: &StatusChange,
) -> Result<Dashboard, BoardError> {
    let mut conn = core.open_db()?;
    let tx = immediate(&mut conn)?;
    let dashboard = store::get_or_create_by_id(&tx, target_user_id)?;
    let dashboard = apply_status_change(&tx, dashboard, change)?;
    tx.commit()?;
    tracing::info!(dashboard_id = %dashboard.id, referral_id = %change.referral_id, status = %change.status, "Status changed for user");
    Ok(dashboard)
}

/// Owner of a dashboard, for the edit-permission check.
pub fn dashboard_owner(core: &CoreState, dashboard_id: &Uuid) -> Result<Uuid, BoardError> {
    let conn = core.open_db()?;
    Ok(store::get(&conn, dashboard_id)?.user_id)
}

fn live_referral(conn: &Connection, referral_id: &Uuid) -> Result<Referral, BoardError> {
    repository::get_referral(conn, referral_id)?.ok_or_else(|| BoardError::not_found("referral", referral_id))
}

pub fn soft_delete_referral(
    core: &CoreState,
    dashboard_id: &Uuid,
    referral_id: &Uuid,
    actor_id: Uuid,
) -> Result<ReferralWithState, BoardError> {
    let mut conn = core.open_db()?;
    let tx = immediate(&mut conn)?;
    let mut dashboard = store::get(&tx, dashboard_id)?;
    let state = transition::soft_delete(&mut dashboard, referral_id, actor_id)?;
    let referral = live_referral(&tx, referral_id)?;
    store::save(&tx, &dashboard)?;
    tx.commit()?;
    tracing::info!(%dashboard_id, %referral_id, deleted_by = %actor_id, "Referral soft-deleted");
    Ok(ReferralWithState::new(referral, &state))
}

pub fn restore_referral(
    core: &CoreState,
    dashboard_id: &Uuid,
    referral_id: &Uuid,
) -> Result<ReferralWithState, BoardError> {
    let mut conn = core.open_db()?;
    let tx = immediate(&mut conn)?;
    let mut dashboard = store::get(&tx, dashboard_id)?;
    let state = transition::restore(&mut dashboard, referral_id)?;
    let referral = live_referral(&tx, referral_id)?;
    store::save(&tx, &dashboard)?;
    tx.commit()?;
    tracing::info!(%dashboard_id, %referral_id, status = %state.status, "Referral restored");
    Ok(ReferralWithState::new(referral, &state))
}

pub fn admin_summary(core: &CoreState) -> Result<StatusSummary, BoardError> {
    let conn = core.open_db()?;
    summary::admin_summary(&conn)
}

// ═══════════════════════════════════════════════════════════
// Referrals
// ═══════════════════════════════════════════════════════════

/// Store the referral, then attach it to every dashboard.
pub async fn create_referral(
    core: Arc<CoreState>,
    actor_id: Uuid,
    data: NewReferral,
    files: Vec<FileUpload>,
) -> Result<Cascaded<Referral>, BoardError> {
    let worker = core.clone();
    let referral = blocking(move || {
        let policy = UploadPolicy::from_config(&worker.config);
        let mut conn = worker.open_db()?;
        referrals::create(&mut conn, worker.storage(), &policy, &data, &files, actor_id)
    })
    .await?;

    let (report, warnings) = cascade(core, CascadeOp::Attach(referral.id), Vec::new()).await;
    Ok(Cascaded {
        value: referral,
        report,
        warnings,
    })
}

pub async fn update_referral(
    core: Arc<CoreState>,
    id: Uuid,
    patch: ReferralPatch,
    additions: Vec<FileUpload>,
    remove_storage_ids: Vec<String>,
) -> Result<UpdateOutcome, BoardError> {
    blocking(move || {
        let policy = UploadPolicy::from_config(&core.config);
        let mut conn = core.open_db()?;
        referrals::update(&mut conn, core.storage(), &policy, &id, &patch, &additions, &remove_storage_ids)
    })
    .await
}

/// Delete the referral, release its files, then detach it from every dashboard.
pub async fn delete_referral_globally(core: Arc<CoreState>, id: Uuid) -> Result<Cascaded<Referral>, BoardError> {
    let worker = core.clone();
    let (removed, unreleased) = blocking(move || {
        let mut conn = worker.open_db()?;
        let removed = referrals::delete(&mut conn, &id)?;
        let unreleased = referrals::release_files(worker.storage(), &removed.files);
        Ok((removed, unreleased))
    })
    .await?;

    let warnings = unreleased
        .iter()
        .map(|f| format!("Stored file '{}' ({}) was not released", f.name, f.storage_id))
        .collect();
    let (report, warnings) = cascade(core, CascadeOp::Detach(id), warnings).await;
    Ok(Cascaded {
        value: removed,
        report,
        warnings,
    })
}

pub fn list_referrals(core: &CoreState, filter: &ReferralFilter) -> Result<Vec<Referral>, BoardError> {
    let conn = core.open_db()?;
    referrals::list(&conn, filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_state::testing::test_core;
    use crate::db::repository::fixtures::{insert_sample_user, sample_new_referral};

    fn upload(name: &str) -> FileUpload {
        FileUpload {
            name: name.into(),
            bytes: b"image-bytes".to_vec(),
        }
    }

    async fn create(core: &Arc<CoreState>, author: Uuid) -> Referral {
        create_referral(core.clone(), author, sample_new_referral(), vec![upload("scan.png")])
            .await
            .unwrap()
            .value
    }

    #[tokio::test]
    async fn first_read_builds_dashboard_from_existing_referrals() {
        let (core, _storage, _tmp) = test_core();
        let conn = core.open_db().unwrap();
        let staff = insert_sample_user(&conn, UserRole::Staff);
        let user = insert_sample_user(&conn, UserRole::User);
        let r1 = create(&core, staff.id).await;
        let r2 = create(&core, staff.id).await;

        let columns = get_dashboard(&core, &user.id).unwrap();
        let ids: Vec<Uuid> = columns.referral.iter().map(|e| e.referral.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&r1.id) && ids.contains(&r2.id));
        assert!(columns.referral.iter().all(|e| e.previous_status.is_none()));

        let again = get_dashboard(&core, &user.id).unwrap();
        assert_eq!(again.len(), 2);
    }

    #[tokio::test]
    async fn creation_cascades_to_existing_dashboards() {
        let (core, _storage, _tmp) = test_core();
        let conn = core.open_db().unwrap();
        let staff = insert_sample_user(&conn, UserRole::Staff);
        let users: Vec<User> = (0..3).map(|_| insert_sample_user(&conn, UserRole::User)).collect();
        for user in &users {
            get_dashboard(&core, &user.id).unwrap();
        }

        let created = create_referral(core.clone(), staff.id, sample_new_referral(), vec![upload("a.png")])
            .await
            .unwrap();
        let report = created.report.unwrap();
        assert_eq!(report.updated, 3);
        assert!(created.warnings.is_empty());

        for user in &users {
            let dashboard = repository::get_dashboard_by_user(&conn, &user.id).unwrap().unwrap();
            assert_eq!(dashboard.states, vec![ReferralState::initial(created.value.id)]);
        }
    }

    #[tokio::test]
    async fn global_delete_detaches_and_releases_files() {
        let (core, storage, _tmp) = test_core();
        let conn = core.open_db().unwrap();
        let staff = insert_sample_user(&conn, UserRole::Staff);
        let user = insert_sample_user(&conn, UserRole::User);
        let referral = create(&core, staff.id).await;
        let columns = get_dashboard(&core, &user.id).unwrap();
        assert_eq!(columns.len(), 1);

        let deleted = delete_referral_globally(core.clone(), referral.id).await.unwrap();
        assert_eq!(deleted.report.unwrap().updated, 1);
        assert!(deleted.warnings.is_empty());
        assert_eq!(storage.len(), 0);

        let dashboard = repository::get_dashboard_by_user(&conn, &user.id).unwrap().unwrap();
        assert!(dashboard.states.is_empty());
        assert!(matches!(
            delete_referral_globally(core.clone(), referral.id).await,
            Err(BoardError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn unreleased_files_become_warnings() {
        let (core, storage, _tmp) = test_core();
        let conn = core.open_db().unwrap();
        let staff = insert_sample_user(&conn, UserRole::Staff);
        let referral = create(&core, staff.id).await;
        *storage.fail_remove_for.lock().unwrap() = Some(referral.files[0].storage_id.clone());

        let deleted = delete_referral_globally(core.clone(), referral.id).await.unwrap();
        assert_eq!(deleted.warnings.len(), 1);
        assert!(deleted.warnings[0].contains("scan.png"));
    }

    #[tokio::test]
    async fn soft_delete_and_restore_round_trip() {
        let (core, _storage, _tmp) = test_core();
        let conn = core.open_db().unwrap();
        let staff = insert_sample_user(&conn, UserRole::Staff);
        let user = insert_sample_user(&conn, UserRole::User);
        let admin = insert_sample_user(&conn, UserRole::Admin);
        let referral = create(&core, staff.id).await;

        let change = StatusChange {
            referral_id: referral.id,
            status: ReferralStatus::Todo,
        };
        let dashboard = set_referral_status(&core, &user.id, &change).unwrap();
        assert_eq!(dashboard_owner(&core, &dashboard.id).unwrap(), user.id);

        let deleted = soft_delete_referral(&core, &dashboard.id, &referral.id, user.id).unwrap();
        assert_eq!(deleted.status, ReferralStatus::Deleted);
        assert_eq!(deleted.previous_status, Some(ReferralStatus::Todo));
        assert_eq!(deleted.deleted_by, Some(user.id));
        assert_eq!(deleted.referral.id, referral.id);

        let restored = restore_referral(&core, &dashboard.id, &referral.id).unwrap();
        assert_eq!(restored.status, ReferralStatus::Todo);
        assert_eq!(restored.previous_status, Some(ReferralStatus::Deleted));
        assert_eq!(restored.deleted_by, None);

        // Admin moves the same referral on the user's board.
        let moved = set_referral_status_for_user(
            &core,
            &user.id,
            &StatusChange { referral_id: referral.id, status: ReferralStatus::Completed },
        )
        .unwrap();
        assert_eq!(moved.state(&referral.id).unwrap().status, ReferralStatus::Completed);
        // The admin's own dashboard is untouched.
        let own = get_dashboard(&core, &admin.id).unwrap();
        assert_eq!(own.referral.len(), 1);
    }

    #[tokio::test]
    async fn status_change_for_unknown_referral_or_user_is_not_found() {
        let (core, _storage, _tmp) = test_core();
        let conn = core.open_db().unwrap();
        let user = insert_sample_user(&conn, UserRole::User);
        let change = StatusChange {
            referral_id: Uuid::new_v4(),
            status: ReferralStatus::Todo,
        };

        assert!(matches!(
            set_referral_status(&core, &user.id, &change),
            Err(BoardError::NotFound { entity, .. }) if entity == "referral"
        ));
        assert!(matches!(
            set_referral_status_for_user(&core, &Uuid::new_v4(), &change),
            Err(BoardError::NotFound { entity, .. }) if entity == "user"
        ));
        assert!(matches!(
            get_dashboard_for_user(&core, &Uuid::new_v4()),
            Err(BoardError::NotFound { .. })
        ));
        assert!(matches!(
            restore_referral(&core, &Uuid::new_v4(), &change.referral_id),
            Err(BoardError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn status_change_creates_missing_state_for_live_referral() {
        let (core, _storage, _tmp) = test_core();
        let conn = core.open_db().unwrap();
        let staff = insert_sample_user(&conn, UserRole::Staff);
        let user = insert_sample_user(&conn, UserRole::User);
        // Dashboard exists before the referral and misses the cascade.
        get_dashboard(&core, &user.id).unwrap();
        let referral = repository::fixtures::sample_referral(staff.id);
        repository::insert_referral(&conn, &referral).unwrap();

        let dashboard = set_referral_status(
            &core,
            &user.id,
            &StatusChange { referral_id: referral.id, status: ReferralStatus::Cancelled },
        )
        .unwrap();
        let state = dashboard.state(&referral.id).unwrap();
        assert_eq!(state.status, ReferralStatus::Cancelled);
        assert_eq!(state.previous_status, Some(ReferralStatus::Referral));
        assert_eq!(dashboard.states.len(), 1);
    }

    #[tokio::test]
    async fn summary_counts_every_dashboard() {
        let (core, _storage, _tmp) = test_core();
        let conn = core.open_db().unwrap();
        let staff = insert_sample_user(&conn, UserRole::Staff);
        let a = insert_sample_user(&conn, UserRole::User);
        let b = insert_sample_user(&conn, UserRole::User);
        let referral = create(&core, staff.id).await;
        get_dashboard(&core, &a.id).unwrap();
        let dashboard = set_referral_status(
            &core,
            &b.id,
            &StatusChange { referral_id: referral.id, status: ReferralStatus::Completed },
        )
        .unwrap();
        soft_delete_referral(&core, &dashboard.id, &referral.id, b.id).unwrap();

        let summary = admin_summary(&core).unwrap();
        assert_eq!(summary.referral, 1);
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.total(), 2);
    }

    #[tokio::test]
    async fn update_and_list_go_through_core() {
        let (core, _storage, _tmp) = test_core();
        let conn = core.open_db().unwrap();
        let staff = insert_sample_user(&conn, UserRole::Staff);
        let referral = create(&core, staff.id).await;

        let patch = ReferralPatch {
            priority: Some("urgent".into()),
            ..Default::default()
        };
        let outcome = update_referral(core.clone(), referral.id, patch, vec![upload("extra.pdf")], vec![])
            .await
            .unwrap();
        assert_eq!(outcome.referral.priority, "urgent");
        assert_eq!(outcome.referral.files.len(), 2);

        let mine = list_referrals(&core, &ReferralFilter { posted_by: Some(staff.id) }).unwrap();
        assert_eq!(mine.len(), 1);
        let theirs = list_referrals(&core, &ReferralFilter { posted_by: Some(Uuid::new_v4()) }).unwrap();
        assert!(theirs.is_empty());
    }

    #[tokio::test]
    async fn concurrent_updates_keep_both_additions() {
        let (core, _storage, _tmp) = test_core();
        let conn = core.open_db().unwrap();
        let staff = insert_sample_user(&conn, UserRole::Staff);
        let referral = create(&core, staff.id).await;

        let (first, second) = tokio::join!(
            update_referral(core.clone(), referral.id, ReferralPatch::default(), vec![upload("one.pdf")], vec![]),
            update_referral(core.clone(), referral.id, ReferralPatch::default(), vec![upload("two.pdf")], vec![]),
        );
        first.unwrap();
        second.unwrap();

        let stored = repository::get_referral(&conn, &referral.id).unwrap().unwrap();
        let mut names: Vec<&str> = stored.files.iter().map(|f| f.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["one.pdf", "scan.png", "two.pdf"]);
    }
}
