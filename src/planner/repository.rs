//! In-memory planner state plus the store it mirrors to.
//!
//! Mutations land in memory first and are then written through to the
//! active store. The lock on the state is never held across an await.

use chrono::NaiveDate;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::{AppConfig, LoadFailurePolicy};
use crate::internal_error::{InternalError, InternalResult};

use super::data::*;
use super::store::{LocalStore, PlannerStore};
use super::visibility::toggle_patch;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadPhase {
    AuthLoading,
    RemoteLoading,
    Ready,
    Failed,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    Local,
    Remote,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryStatus {
    pub phase: LoadPhase,
    pub mode: StoreMode,
    pub is_local_mode: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Ready(StoreMode),
    Failed(String),
    /// A newer load started before this one finished; its results were
    /// dropped.
    Superseded,
}

#[derive(Debug, Clone, Copy)]
pub struct RepositoryOptions {
    pub load_timeout: Duration,
    pub load_failure: LoadFailurePolicy,
}

impl Default for RepositoryOptions {
    fn default() -> RepositoryOptions {
        RepositoryOptions {
            load_timeout: Duration::from_secs(8),
            load_failure: LoadFailurePolicy::Fallback,
        }
    }
}

impl RepositoryOptions {
    pub fn from_config(config: &AppConfig) -> RepositoryOptions {
        RepositoryOptions {
            load_timeout: config.load_timeout(),
            load_failure: config.load_failure,
        }
    }
}

struct RepositoryState {
    phase: LoadPhase,
    mode: StoreMode,
    error: Option<String>,
    generation: u64,
    tasks: Vec<Task>,
    categories: Vec<Category>,
    settings: Settings,
}

impl RepositoryState {
    fn install(&mut self, snapshot: PlannerSnapshot, mode: StoreMode) {
        self.tasks = snapshot.tasks;
        self.categories = snapshot.categories;
        self.settings = snapshot.settings;
        self.mode = mode;
        self.phase = LoadPhase::Ready;
    }

    fn ready(&self) -> InternalResult<StoreMode> {
        match self.phase {
            LoadPhase::Ready => Ok(self.mode),
            LoadPhase::Failed => Err(InternalError::NotReady(
                self.error
                    .clone()
                    .unwrap_or_else(|| "planner data failed to load".to_string()),
            )),
            LoadPhase::AuthLoading | LoadPhase::RemoteLoading => {
                Err(InternalError::NotReady("planner data is still loading".to_string()))
            }
        }
    }

    fn task_index(&self, id: &str) -> InternalResult<usize> {
        self.tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or_else(|| InternalError::not_found(format!("task {}", id)))
    }
}

pub struct PlannerRepository {
    local: Arc<LocalStore>,
    remote: Option<Arc<dyn PlannerStore>>,
    options: RepositoryOptions,
    state: Mutex<RepositoryState>,
}

impl PlannerRepository {
    pub fn new(
        local: Arc<LocalStore>,
        remote: Option<Arc<dyn PlannerStore>>,
        options: RepositoryOptions,
    ) -> PlannerRepository {
        let mode = if remote.is_some() {
            StoreMode::Remote
        } else {
            StoreMode::Local
        };

        PlannerRepository {
            local,
            remote,
            options,
            state: Mutex::new(RepositoryState {
                phase: LoadPhase::AuthLoading,
                mode,
                error: None,
                generation: 0,
                tasks: vec![],
                categories: default_categories(),
                settings: Settings::default(),
            }),
        }
    }

    fn state(&self) -> InternalResult<MutexGuard<'_, RepositoryState>> {
        Ok(self.state.lock()?)
    }

    pub fn local(&self) -> &Arc<LocalStore> {
        &self.local
    }

    pub fn remote(&self) -> Option<&Arc<dyn PlannerStore>> {
        self.remote.as_ref()
    }

    fn store(&self, mode: StoreMode) -> Arc<dyn PlannerStore> {
        match (mode, &self.remote) {
            (StoreMode::Remote, Some(remote)) => remote.clone(),
            _ => self.local.clone() as Arc<dyn PlannerStore>,
        }
    }

    fn local_snapshot(&self) -> PlannerSnapshot {
        match self.local.load_snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "could not read local storage, starting from defaults");
                PlannerSnapshot::default()
            }
        }
    }

    /// Reloads the planner data from the store matching the session state.
    pub async fn load(&self, signed_in: bool) -> InternalResult<LoadOutcome> {
        let remote = match (&self.remote, signed_in) {
            (Some(remote), true) => Some(remote.clone()),
            _ => None,
        };

        let generation = {
            let mut state = self.state()?;
            state.generation += 1;
            state.phase = match remote {
                Some(_) => LoadPhase::RemoteLoading,
                None => LoadPhase::AuthLoading,
            };
            state.generation
        };

        let Some(remote) = remote else {
            let snapshot = self.local_snapshot();

            let mut state = self.state()?;
            if state.generation != generation {
                return Ok(LoadOutcome::Superseded);
            }
            state.install(snapshot, StoreMode::Local);
            state.error = None;
            debug!(tasks = state.tasks.len(), "loaded planner from local storage");

            return Ok(LoadOutcome::Ready(StoreMode::Local));
        };

        let fetch = async {
            tokio::try_join!(
                remote.get_tasks(),
                remote.get_categories(),
                remote.get_settings()
            )
        };

        let result = match timeout(self.options.load_timeout, fetch).await {
            Ok(Ok((tasks, categories, settings))) => Ok(PlannerSnapshot {
                tasks,
                categories,
                settings,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(InternalError::Timeout(self.options.load_timeout)),
        };

        let fallback = match (&result, self.options.load_failure) {
            (Err(_), LoadFailurePolicy::Fallback) => Some(self.local_snapshot()),
            _ => None,
        };

        let mut state = self.state()?;
        if state.generation != generation {
            debug!(generation, "discarding superseded load");
            return Ok(LoadOutcome::Superseded);
        }

        match result {
            Ok(snapshot) => {
                state.install(snapshot, StoreMode::Remote);
                state.error = None;
                info!(tasks = state.tasks.len(), "loaded planner from backend");
                Ok(LoadOutcome::Ready(StoreMode::Remote))
            }
            Err(e) => {
                let message = e.to_string();
                match fallback {
                    Some(snapshot) => {
                        warn!(error = %message, "backend load failed, using local storage");
                        state.install(snapshot, StoreMode::Local);
                        state.error = Some(message);
                        Ok(LoadOutcome::Ready(StoreMode::Local))
                    }
                    None => {
                        warn!(error = %message, "backend load failed");
                        state.phase = LoadPhase::Failed;
                        state.error = Some(message.clone());
                        Ok(LoadOutcome::Failed(message))
                    }
                }
            }
        }
    }

    pub fn status(&self) -> InternalResult<RepositoryStatus> {
        let state = self.state()?;

        Ok(RepositoryStatus {
            phase: state.phase,
            mode: state.mode,
            is_local_mode: state.mode == StoreMode::Local,
            error: state.error.clone(),
        })
    }

    pub fn snapshot(&self) -> InternalResult<PlannerSnapshot> {
        let state = self.state()?;

        Ok(PlannerSnapshot {
            tasks: state.tasks.clone(),
            categories: state.categories.clone(),
            settings: state.settings,
        })
    }

    pub fn tasks(&self) -> InternalResult<Vec<Task>> {
        Ok(self.state()?.tasks.clone())
    }

    /// Handles a failed write-through. Local writes are best effort; remote
    /// failures undo the in-memory change and reach the caller.
    fn mirror_failed<T>(
        &self,
        mode: StoreMode,
        error: InternalError,
        value: T,
        rollback: impl FnOnce(&mut RepositoryState),
    ) -> InternalResult<T> {
        match mode {
            StoreMode::Local => {
                warn!(error = %error, "local storage write failed");
                Ok(value)
            }
            StoreMode::Remote => {
                warn!(error = %error, "backend write failed, rolling back");
                rollback(&mut *self.state()?);
                Err(error)
            }
        }
    }

    pub async fn add_task(&self, form: NewTask, author: &TaskAuthor) -> InternalResult<Task> {
        let task = form.into_task(new_id(), author)?;

        let mode = {
            let mut state = self.state()?;
            let mode = state.ready()?;
            state.tasks.insert(0, task.clone());
            mode
        };

        match self.store(mode).create_task(&task).await {
            Ok(stored) => {
                if mode == StoreMode::Remote {
                    let mut state = self.state()?;
                    if let Some(slot) = state.tasks.iter_mut().find(|t| t.id == stored.id) {
                        *slot = stored.clone();
                    }
                }
                Ok(stored)
            }
            Err(e) => self.mirror_failed(mode, e, task.clone(), |state| {
                state.tasks.retain(|t| t.id != task.id)
            }),
        }
    }

    async fn patch_task(
        &self,
        id: &str,
        make_patch: impl FnOnce(&Task) -> TaskPatch,
    ) -> InternalResult<Task> {
        let (mode, previous, updated, patch) = {
            let mut state = self.state()?;
            let mode = state.ready()?;
            let index = state.task_index(id)?;

            let previous = state.tasks[index].clone();
            let patch = make_patch(&previous);
            state.tasks[index].apply(&patch);

            (mode, previous, state.tasks[index].clone(), patch)
        };

        match self.store(mode).update_task(id, &patch).await {
            Ok(_) => Ok(updated),
            Err(e) => self.mirror_failed(mode, e, updated, |state| {
                if let Some(slot) = state.tasks.iter_mut().find(|t| t.id == previous.id) {
                    *slot = previous;
                }
            }),
        }
    }

    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> InternalResult<Task> {
        patch.validate()?;
        self.patch_task(id, |_| patch).await
    }

    /// Flips completion of a task for `date`.
    pub async fn toggle_task(&self, id: &str, date: NaiveDate) -> InternalResult<Task> {
        self.patch_task(id, |task| toggle_patch(task, date)).await
    }

    pub async fn delete_task(&self, id: &str) -> InternalResult<()> {
        let (mode, index, removed) = {
            let mut state = self.state()?;
            let mode = state.ready()?;
            let index = state.task_index(id)?;
            (mode, index, state.tasks.remove(index))
        };

        match self.store(mode).delete_task(id).await {
            Ok(()) => Ok(()),
            Err(e) => self.mirror_failed(mode, e, (), |state| {
                let index = index.min(state.tasks.len());
                state.tasks.insert(index, removed);
            }),
        }
    }

    pub async fn add_category(&self, form: NewCategory) -> InternalResult<Category> {
        let category = form.into_category(new_id())?;

        let mode = {
            let mut state = self.state()?;
            let mode = state.ready()?;
            state.categories.push(category.clone());
            mode
        };

        match self.store(mode).create_category(&category).await {
            Ok(stored) => Ok(stored),
            Err(e) => self.mirror_failed(mode, e, category.clone(), |state| {
                state.categories.retain(|c| c.id != category.id)
            }),
        }
    }

    /// Removes a category and clears it from every task that used it.
    pub async fn delete_category(&self, id: &str) -> InternalResult<()> {
        let (mode, removed, orphaned) = {
            let mut state = self.state()?;
            let mode = state.ready()?;

            let removed = state
                .categories
                .iter()
                .position(|c| c.id == id)
                .map(|index| (index, state.categories.remove(index)));

            let mut orphaned = vec![];
            for task in state.tasks.iter_mut() {
                if task.category_id.as_deref() == Some(id) {
                    task.category_id = None;
                    orphaned.push(task.id.clone());
                }
            }

            (mode, removed, orphaned)
        };

        match self.store(mode).delete_category(id).await {
            Ok(()) => Ok(()),
            Err(e) => self.mirror_failed(mode, e, (), |state| {
                if let Some((index, category)) = removed {
                    let index = index.min(state.categories.len());
                    state.categories.insert(index, category);
                }
                for task in state.tasks.iter_mut() {
                    if orphaned.contains(&task.id) {
                        task.category_id = Some(id.to_string());
                    }
                }
            }),
        }
    }

    pub async fn update_settings(&self, settings: Settings) -> InternalResult<Settings> {
        let (mode, previous) = {
            let mut state = self.state()?;
            let mode = state.ready()?;
            let previous = state.settings;
            state.settings = settings;
            (mode, previous)
        };

        match self.store(mode).update_settings(&settings).await {
            Ok(_) => Ok(settings),
            Err(e) => self.mirror_failed(mode, e, settings, |state| state.settings = previous),
        }
    }

    /// Empties the planner and restores default categories and settings.
    pub async fn clear_all(&self) -> InternalResult<PlannerSnapshot> {
        let (mode, previous) = {
            let mut state = self.state()?;
            let mode = state.ready()?;
            let previous = PlannerSnapshot {
                tasks: std::mem::take(&mut state.tasks),
                categories: std::mem::replace(&mut state.categories, default_categories()),
                settings: std::mem::take(&mut state.settings),
            };
            (mode, previous)
        };

        match self.store(mode).clear_all().await {
            Ok(categories) => {
                let mut state = self.state()?;
                state.categories = categories;
                info!(mode = ?mode, "planner cleared");
            }
            Err(e) => {
                self.mirror_failed(mode, e, (), |state| {
                    state.tasks = previous.tasks;
                    state.categories = previous.categories;
                    state.settings = previous.settings;
                })?;
            }
        }

        self.snapshot()
    }
}
