use serde::Serialize;
use tracing::{info, warn};

use crate::internal_error::InternalResult;

use super::store::{LocalStore, PlannerStore};

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub nothing_to_migrate: bool,
    pub tasks: usize,
    pub categories: usize,
    pub settings: bool,
    pub failed: usize,
}

/// One-way copy of the local planner data into `remote`: categories, then
/// tasks, then settings. Items the backend rejects are counted and skipped.
pub async fn migrate_local_to_remote(
    local: &LocalStore,
    remote: &dyn PlannerStore,
) -> InternalResult<MigrationReport> {
    if !local.has_data()? {
        info!("no local data to migrate");
        return Ok(MigrationReport {
            nothing_to_migrate: true,
            ..MigrationReport::default()
        });
    }

    let snapshot = local.load_snapshot()?;
    let mut report = MigrationReport::default();

    for category in snapshot.categories.iter() {
        match remote.create_category(category).await {
            Ok(_) => report.categories += 1,
            Err(e) => {
                warn!(error = %e, category = %category.name, "category not migrated");
                report.failed += 1;
            }
        }
    }

    for task in snapshot.tasks.iter() {
        match remote.create_task(task).await {
            Ok(_) => report.tasks += 1,
            Err(e) => {
                warn!(error = %e, task_id = %task.id, "task not migrated");
                report.failed += 1;
            }
        }
    }

    match remote.update_settings(&snapshot.settings).await {
        Ok(_) => report.settings = true,
        Err(e) => {
            warn!(error = %e, "settings not migrated");
            report.failed += 1;
        }
    }

    info!(
        tasks = report.tasks,
        categories = report.categories,
        failed = report.failed,
        "local data migrated"
    );
    Ok(report)
}
