use async_trait::async_trait;
use tracing::debug;

use crate::internal_error::{InternalError, InternalResult};
use crate::local_storage::{LocalStorage, CATEGORIES_KEY, SETTINGS_KEY, TASKS_KEY};

use super::data::*;

/// Durable home of the planner data. One implementation talks to the hosted
/// backend, the other to local storage; the repository picks one per load.
#[async_trait]
pub trait PlannerStore: Send + Sync {
    async fn get_tasks(&self) -> InternalResult<Vec<Task>>;
    async fn create_task(&self, task: &Task) -> InternalResult<Task>;
    async fn update_task(&self, id: &str, patch: &TaskPatch) -> InternalResult<Task>;
    async fn delete_task(&self, id: &str) -> InternalResult<()>;

    async fn get_categories(&self) -> InternalResult<Vec<Category>>;
    async fn create_category(&self, category: &Category) -> InternalResult<Category>;
    async fn delete_category(&self, id: &str) -> InternalResult<()>;

    async fn get_settings(&self) -> InternalResult<Settings>;
    async fn update_settings(&self, settings: &Settings) -> InternalResult<Settings>;

    /// Wipes tasks, categories and settings and returns the default
    /// categories as recreated by the store.
    async fn clear_all(&self) -> InternalResult<Vec<Category>>;
}

/// Planner data kept in local storage. Every write serializes the whole
/// collection back under its key.
#[derive(Clone)]
pub struct LocalStore {
    storage: LocalStorage,
}

impl LocalStore {
    pub fn new(storage: LocalStorage) -> LocalStore {
        LocalStore { storage }
    }

    pub fn has_data(&self) -> InternalResult<bool> {
        for key in [TASKS_KEY, CATEGORIES_KEY, SETTINGS_KEY] {
            if self.storage.get_item(key)?.is_some() {
                return Ok(true);
            }
        }

        Ok(false)
    }

    pub fn load_tasks(&self) -> InternalResult<Vec<Task>> {
        Ok(self.storage.read_json(TASKS_KEY)?.unwrap_or_default())
    }

    pub fn save_tasks(&self, tasks: &[Task]) -> InternalResult<()> {
        debug!(count = tasks.len(), "writing tasks to local storage");
        self.storage.write_json(TASKS_KEY, tasks)
    }

    pub fn load_categories(&self) -> InternalResult<Vec<Category>> {
        Ok(self
            .storage
            .read_json(CATEGORIES_KEY)?
            .unwrap_or_else(default_categories))
    }

    pub fn save_categories(&self, categories: &[Category]) -> InternalResult<()> {
        self.storage.write_json(CATEGORIES_KEY, categories)
    }

    pub fn load_settings(&self) -> InternalResult<Settings> {
        Ok(self.storage.read_json(SETTINGS_KEY)?.unwrap_or_default())
    }

    pub fn save_settings(&self, settings: &Settings) -> InternalResult<()> {
        self.storage.write_json(SETTINGS_KEY, settings)
    }

    pub fn load_snapshot(&self) -> InternalResult<PlannerSnapshot> {
        Ok(PlannerSnapshot {
            tasks: self.load_tasks()?,
            categories: self.load_categories()?,
            settings: self.load_settings()?,
        })
    }
}

#[async_trait]
impl PlannerStore for LocalStore {
    async fn get_tasks(&self) -> InternalResult<Vec<Task>> {
        self.load_tasks()
    }

    async fn create_task(&self, task: &Task) -> InternalResult<Task> {
        let mut tasks = self.load_tasks()?;
        tasks.insert(0, task.clone());
        self.save_tasks(&tasks)?;

        Ok(task.clone())
    }

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> InternalResult<Task> {
        let mut tasks = self.load_tasks()?;

        let task = tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| InternalError::not_found(format!("task {}", id)))?;
        task.apply(patch);
        let updated = task.clone();

        self.save_tasks(&tasks)?;

        Ok(updated)
    }

    async fn delete_task(&self, id: &str) -> InternalResult<()> {
        let mut tasks = self.load_tasks()?;
        tasks.retain(|task| task.id != id);
        self.save_tasks(&tasks)
    }

    async fn get_categories(&self) -> InternalResult<Vec<Category>> {
        self.load_categories()
    }

    async fn create_category(&self, category: &Category) -> InternalResult<Category> {
        let mut categories = self.load_categories()?;
        categories.push(category.clone());
        self.save_categories(&categories)?;

        Ok(category.clone())
    }

    async fn delete_category(&self, id: &str) -> InternalResult<()> {
        let mut categories = self.load_categories()?;
        categories.retain(|category| category.id != id);
        self.save_categories(&categories)?;

        let mut tasks = self.load_tasks()?;
        for task in tasks.iter_mut() {
            if task.category_id.as_deref() == Some(id) {
                task.category_id = None;
            }
        }
        self.save_tasks(&tasks)
    }

    async fn get_settings(&self) -> InternalResult<Settings> {
        self.load_settings()
    }

    async fn update_settings(&self, settings: &Settings) -> InternalResult<Settings> {
        self.save_settings(settings)?;
        Ok(*settings)
    }

    async fn clear_all(&self) -> InternalResult<Vec<Category>> {
        let categories = default_categories();

        self.save_tasks(&[])?;
        self.save_categories(&categories)?;
        self.save_settings(&Settings::default())?;

        Ok(categories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn store() -> LocalStore {
        LocalStore::new(LocalStorage::in_memory().unwrap())
    }

    fn one_off(id: &str, category_id: Option<&str>) -> Task {
        NewTask {
            text: format!("task {}", id),
            date: NaiveDate::from_ymd_opt(2024, 6, 1),
            category_id: category_id.map(str::to_string),
            ..NewTask::default()
        }
        .into_task(
            id.into(),
            &TaskAuthor {
                user_id: "local-user".into(),
                workspace_id: "workspace-local".into(),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn empty_storage_hydrates_defaults() {
        let store = store();
        assert!(!store.has_data().unwrap());

        let snapshot = store.load_snapshot().unwrap();
        assert!(snapshot.tasks.is_empty());
        assert_eq!(snapshot.categories, default_categories());
        assert_eq!(snapshot.settings, Settings::default());
    }

    #[tokio::test]
    async fn new_tasks_go_first() {
        let store = store();
        store.create_task(&one_off("a", None)).await.unwrap();
        store.create_task(&one_off("b", None)).await.unwrap();

        let ids: Vec<String> = store.get_tasks().await.unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(store.has_data().unwrap());
    }

    #[tokio::test]
    async fn deleting_category_clears_references() {
        let store = store();
        store.create_task(&one_off("a", Some("1"))).await.unwrap();
        store.create_task(&one_off("b", Some("2"))).await.unwrap();

        store.delete_category("1").await.unwrap();

        let tasks = store.get_tasks().await.unwrap();
        assert_eq!(tasks.len(), 2);
        let a = tasks.iter().find(|t| t.id == "a").unwrap();
        let b = tasks.iter().find(|t| t.id == "b").unwrap();
        assert_eq!(a.category_id, None);
        assert_eq!(b.category_id.as_deref(), Some("2"));

        let categories = store.get_categories().await.unwrap();
        assert!(categories.iter().all(|c| c.id != "1"));
    }

    #[tokio::test]
    async fn update_of_unknown_task_is_not_found() {
        let store = store();
        let result = store.update_task("missing", &TaskPatch::default()).await;
        assert!(matches!(result, Err(InternalError::NotFound(_))));
    }

    #[tokio::test]
    async fn clear_all_restores_defaults() {
        let store = store();
        store.create_task(&one_off("a", None)).await.unwrap();
        store
            .update_settings(&Settings {
                dark_mode: true,
                show_completed: false,
                confirm_delete: false,
            })
            .await
            .unwrap();

        let categories = store.clear_all().await.unwrap();
        assert_eq!(categories, default_categories());
        assert!(store.get_tasks().await.unwrap().is_empty());
        assert_eq!(store.get_settings().await.unwrap(), Settings::default());
    }
}
