//! Planner store backed by the hosted database, spoken to through its
//! PostgREST interface. Rows use snake_case columns; the translation to the
//! in-memory shape happens here and nowhere else.

use async_trait::async_trait;
use chrono::{Local, NaiveDate, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use std::collections::BTreeSet;
use std::sync::Mutex;

use crate::auth::client::SessionReceiver;
use crate::auth::data::Session;
use crate::config::BackendConfig;
use crate::internal_error::{InternalError, InternalResult};

use super::data::*;
use super::store::PlannerStore;

const UNIQUE_VIOLATION: &str = "23505";
const DEFAULT_WORKSPACE_NAME: &str = "Meu Workspace";
const SETTING_KEYS: [&str; 3] = ["darkMode", "showCompleted", "confirmDelete"];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TaskRow {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub is_permanent: Option<bool>,
    #[serde(default)]
    pub completed_dates: Option<BTreeSet<NaiveDate>>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub is_delivery: Option<bool>,
    #[serde(default)]
    pub delivery_date: Option<NaiveDate>,
    #[serde(default)]
    pub assigned_to_id: Option<String>,
    #[serde(default)]
    pub created_by_id: Option<String>,
    #[serde(default)]
    pub workspace_id: Option<String>,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Task {
        Task {
            id: row.id,
            text: row.text,
            is_permanent: row.is_permanent.unwrap_or(false),
            is_delivery: row.is_delivery.unwrap_or(false),
            date: row.date,
            delivery_date: row.delivery_date,
            completed_dates: row.completed_dates.unwrap_or_default(),
            completed: row.completed.unwrap_or(false),
            category_id: row.category,
            assigned_to_id: row.assigned_to_id.unwrap_or_default(),
            created_by_id: row.created_by_id.unwrap_or_default(),
            workspace_id: row.workspace_id.unwrap_or_default(),
        }
    }
}

impl TaskRow {
    /// Row for an insert. The backend requires a date, so tasks without one
    /// are stamped with today.
    pub fn for_insert(task: &Task, binding: &WorkspaceBinding, today: NaiveDate) -> TaskRow {
        let assigned_to_id = if task.assigned_to_id.is_empty() || task.assigned_to_id == binding.user_id {
            binding.member_id.clone()
        } else {
            task.assigned_to_id.clone()
        };

        TaskRow {
            id: task.id.clone(),
            text: task.text.clone(),
            is_permanent: Some(task.is_permanent),
            completed_dates: Some(task.completed_dates.clone()),
            date: Some(task.date.unwrap_or(today)),
            completed: Some(task.completed),
            category: task.category_id.clone(),
            is_delivery: Some(task.is_delivery),
            delivery_date: task.delivery_date,
            assigned_to_id: Some(assigned_to_id),
            created_by_id: Some(binding.member_id.clone()),
            workspace_id: Some(binding.workspace_id.clone()),
        }
    }
}

/// Column values for a partial task update; only fields present in the
/// patch are sent, plus the update timestamp.
pub fn patch_columns(patch: &TaskPatch, now: &str) -> Map<String, Value> {
    let mut columns = Map::new();
    columns.insert("updated_at".into(), json!(now));

    if let Some(text) = &patch.text {
        columns.insert("text".into(), json!(text));
    }
    if let Some(is_permanent) = patch.is_permanent {
        columns.insert("is_permanent".into(), json!(is_permanent));
    }
    if let Some(completed_dates) = &patch.completed_dates {
        columns.insert("completed_dates".into(), json!(completed_dates));
    }
    if let Some(date) = patch.date {
        columns.insert("date".into(), json!(date));
    }
    if let Some(completed) = patch.completed {
        columns.insert("completed".into(), json!(completed));
    }
    if let Some(category_id) = &patch.category_id {
        columns.insert("category".into(), json!(category_id));
    }
    if let Some(is_delivery) = patch.is_delivery {
        columns.insert("is_delivery".into(), json!(is_delivery));
    }
    if let Some(delivery_date) = patch.delivery_date {
        columns.insert("delivery_date".into(), json!(delivery_date));
    }
    if let Some(assigned_to_id) = &patch.assigned_to_id {
        columns.insert("assigned_to_id".into(), json!(assigned_to_id));
    }

    columns
}

#[derive(Deserialize, Debug)]
struct IdRow {
    id: String,
}

#[derive(Deserialize, Debug)]
struct SettingRow {
    key: String,
    value: Value,
}

#[derive(Deserialize, Debug, Default)]
struct BackendErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

/// The user's workspace and membership rows, resolved on first access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceBinding {
    pub user_id: String,
    pub workspace_id: String,
    pub member_id: String,
}

pub struct RemoteStore {
    http: Client,
    backend: BackendConfig,
    session: SessionReceiver,
    binding: Mutex<Option<WorkspaceBinding>>,
}

async fn backend_response<T: DeserializeOwned>(response: Response) -> InternalResult<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    Err(backend_error(status.as_u16(), response).await)
}

async fn backend_ok(response: Response) -> InternalResult<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    Err(backend_error(status.as_u16(), response).await)
}

async fn backend_error(status: u16, response: Response) -> InternalError {
    let body = response.text().await.unwrap_or_default();
    let parsed: BackendErrorBody = serde_json::from_str(&body).unwrap_or_default();

    let message = match (parsed.message, parsed.details) {
        (Some(message), Some(details)) => format!("{} ({})", message, details),
        (Some(message), None) => message,
        (None, _) => body,
    };

    InternalError::Backend {
        status,
        code: parsed.code,
        message,
    }
}

fn setting_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Object(inner) => inner.get("value").and_then(Value::as_bool),
        _ => None,
    }
}

impl RemoteStore {
    pub fn new(http: Client, backend: BackendConfig, session: SessionReceiver) -> RemoteStore {
        RemoteStore {
            http,
            backend,
            session,
            binding: Mutex::new(None),
        }
    }

    fn table(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.backend.url, table)
    }

    fn session(&self) -> InternalResult<Session> {
        self.session
            .borrow()
            .clone()
            .ok_or(InternalError::NotSignedIn)
    }

    fn authorized(&self, builder: RequestBuilder, session: &Session) -> RequestBuilder {
        builder
            .header("apikey", &self.backend.anon_key)
            .bearer_auth(&session.access_token)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        session: &Session,
    ) -> InternalResult<T> {
        let response = self.authorized(builder, session).send().await?;
        backend_response(response).await
    }

    async fn insert_returning<T: DeserializeOwned>(
        &self,
        table: &str,
        body: &Value,
        session: &Session,
    ) -> InternalResult<T> {
        let response = self
            .authorized(self.http.post(self.table(table)), session)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;

        let mut rows: Vec<T> = backend_response(response).await?;
        if rows.is_empty() {
            return Err(InternalError::Backend {
                status: 200,
                code: None,
                message: format!("insert into {} returned no row", table),
            });
        }

        Ok(rows.remove(0))
    }

    async fn execute(&self, builder: RequestBuilder, session: &Session) -> InternalResult<()> {
        let response = self.authorized(builder, session).send().await?;
        backend_ok(response).await
    }

    /// Finds the user's workspace and membership, creating both on first use.
    pub async fn binding(&self) -> InternalResult<WorkspaceBinding> {
        let session = self.session()?;
        let user_id = session.user.id.clone();

        let cached = self.binding.lock()?.clone();
        if let Some(binding) = cached {
            if binding.user_id == user_id {
                return Ok(binding);
            }
        }

        let workspaces: Vec<IdRow> = self
            .select(
                self.http
                    .get(self.table("workspaces"))
                    .query(&[("select", "id"), ("limit", "1")])
                    .query(&[("owner_id", format!("eq.{}", user_id))]),
                &session,
            )
            .await?;

        let workspace_id = match workspaces.into_iter().next() {
            Some(row) => row.id,
            None => {
                info!(%user_id, "creating personal workspace");
                let row: IdRow = self
                    .insert_returning(
                        "workspaces",
                        &json!({
                            "name": DEFAULT_WORKSPACE_NAME,
                            "type": "personal",
                            "owner_id": user_id,
                        }),
                        &session,
                    )
                    .await?;
                row.id
            }
        };

        let members: Vec<IdRow> = self
            .select(
                self.http
                    .get(self.table("workspace_members"))
                    .query(&[("select", "id"), ("limit", "1")])
                    .query(&[
                        ("workspace_id", format!("eq.{}", workspace_id)),
                        ("user_id", format!("eq.{}", user_id)),
                    ]),
                &session,
            )
            .await?;

        let member_id = match members.into_iter().next() {
            Some(row) => row.id,
            None => {
                let email = session.user.email.clone().unwrap_or_default();
                let name = email.split('@').next().unwrap_or_default().to_string();

                let row: IdRow = self
                    .insert_returning(
                        "workspace_members",
                        &json!({
                            "workspace_id": workspace_id,
                            "user_id": user_id,
                            "role": "owner",
                            "name": name,
                            "email": email,
                        }),
                        &session,
                    )
                    .await?;
                row.id
            }
        };

        let binding = WorkspaceBinding {
            user_id,
            workspace_id,
            member_id,
        };
        *self.binding.lock()? = Some(binding.clone());
        debug!(?binding, "workspace binding resolved");

        Ok(binding)
    }

    async fn fetch_categories(
        &self,
        binding: &WorkspaceBinding,
        session: &Session,
    ) -> InternalResult<Vec<Category>> {
        self.select(
            self.http
                .get(self.table("categories"))
                .query(&[("select", "id,name,color"), ("order", "created_at.asc")])
                .query(&[("workspace_id", format!("eq.{}", binding.workspace_id))]),
            session,
        )
        .await
    }

    async fn insert_category(
        &self,
        category: &Category,
        binding: &WorkspaceBinding,
        session: &Session,
    ) -> InternalResult<()> {
        self.execute(
            self.http.post(self.table("categories")).json(&json!({
                "id": category.id,
                "workspace_id": binding.workspace_id,
                "name": category.name,
                "color": category.color,
            })),
            session,
        )
        .await
    }

    async fn upsert_settings(
        &self,
        settings: &Settings,
        binding: &WorkspaceBinding,
        session: &Session,
    ) -> InternalResult<()> {
        let now = Utc::now().to_rfc3339();
        let values = [
            settings.dark_mode,
            settings.show_completed,
            settings.confirm_delete,
        ];

        let rows: Vec<Value> = SETTING_KEYS
            .iter()
            .zip(values.iter())
            .map(|(key, value)| {
                json!({
                    "workspace_id": binding.workspace_id,
                    "key": key,
                    "value": { "value": value },
                    "updated_at": now,
                })
            })
            .collect();

        self.execute(
            self.http
                .post(self.table("settings"))
                .query(&[("on_conflict", "workspace_id,key")])
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(&rows),
            session,
        )
        .await
    }
}

#[async_trait]
impl PlannerStore for RemoteStore {
    async fn get_tasks(&self) -> InternalResult<Vec<Task>> {
        let session = self.session()?;
        let binding = self.binding().await?;

        let rows: Vec<TaskRow> = self
            .select(
                self.http
                    .get(self.table("tasks"))
                    .query(&[
                        (
                            "select",
                            "id,text,is_permanent,completed_dates,date,completed,category,is_delivery,delivery_date,assigned_to_id,created_by_id,workspace_id,created_at,updated_at",
                        ),
                        ("order", "created_at.desc"),
                    ])
                    .query(&[("workspace_id", format!("eq.{}", binding.workspace_id))]),
                &session,
            )
            .await?;

        Ok(rows.into_iter().map(Task::from).collect())
    }

    async fn create_task(&self, task: &Task) -> InternalResult<Task> {
        let session = self.session()?;
        let binding = self.binding().await?;

        let row = TaskRow::for_insert(task, &binding, Local::now().date_naive());
        let stored: TaskRow = self
            .insert_returning("tasks", &serde_json::to_value(&row)?, &session)
            .await?;

        let mut created = Task::from(stored);
        // Undated tasks were stamped with today on insert.
        created.date = task.date;
        Ok(created)
    }

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> InternalResult<Task> {
        let session = self.session()?;
        let columns = patch_columns(patch, &Utc::now().to_rfc3339());

        let rows: Vec<TaskRow> = self
            .select(
                self.http
                    .patch(self.table("tasks"))
                    .query(&[("id", format!("eq.{}", id))])
                    .header("Prefer", "return=representation")
                    .json(&columns),
                &session,
            )
            .await?;

        rows.into_iter()
            .next()
            .map(Task::from)
            .ok_or_else(|| InternalError::not_found(format!("task {}", id)))
    }

    async fn delete_task(&self, id: &str) -> InternalResult<()> {
        let session = self.session()?;

        self.execute(
            self.http
                .delete(self.table("tasks"))
                .query(&[("id", format!("eq.{}", id))]),
            &session,
        )
        .await
    }

    async fn get_categories(&self) -> InternalResult<Vec<Category>> {
        let session = self.session()?;
        let binding = self.binding().await?;

        let categories = self.fetch_categories(&binding, &session).await?;
        if !categories.is_empty() {
            return Ok(categories);
        }

        let mut created = vec![];
        for category in fresh_default_categories() {
            match self.insert_category(&category, &binding, &session).await {
                Ok(()) => created.push(category),
                Err(InternalError::Backend { code: Some(code), .. }) if code == UNIQUE_VIOLATION => {
                    debug!(name = %category.name, "default category already present");
                }
                Err(e) => return Err(e),
            }
        }

        if created.is_empty() {
            return self.fetch_categories(&binding, &session).await;
        }

        Ok(created)
    }

    async fn create_category(&self, category: &Category) -> InternalResult<Category> {
        let session = self.session()?;
        let binding = self.binding().await?;

        self.insert_category(category, &binding, &session).await?;
        Ok(category.clone())
    }

    async fn delete_category(&self, id: &str) -> InternalResult<()> {
        let session = self.session()?;

        self.execute(
            self.http
                .delete(self.table("categories"))
                .query(&[("id", format!("eq.{}", id))]),
            &session,
        )
        .await?;

        self.execute(
            self.http
                .patch(self.table("tasks"))
                .query(&[("category", format!("eq.{}", id))])
                .json(&json!({ "category": null })),
            &session,
        )
        .await
    }

    async fn get_settings(&self) -> InternalResult<Settings> {
        let session = self.session()?;
        let binding = self.binding().await?;

        let rows: Vec<SettingRow> = self
            .select(
                self.http
                    .get(self.table("settings"))
                    .query(&[("select", "key,value")])
                    .query(&[
                        ("workspace_id", format!("eq.{}", binding.workspace_id)),
                        ("key", format!("in.({})", SETTING_KEYS.join(","))),
                    ]),
                &session,
            )
            .await?;

        let lookup = |key: &str| {
            rows.iter()
                .find(|row| row.key == key)
                .and_then(|row| setting_value(&row.value))
        };

        let dark_mode = lookup("darkMode");
        let show_completed = lookup("showCompleted");
        let confirm_delete = lookup("confirmDelete");

        let defaults = Settings::default();
        if dark_mode.is_none() && show_completed.is_none() && confirm_delete.is_none() {
            self.upsert_settings(&defaults, &binding, &session).await?;
            return Ok(defaults);
        }

        Ok(Settings {
            dark_mode: dark_mode.unwrap_or(defaults.dark_mode),
            show_completed: show_completed.unwrap_or(defaults.show_completed),
            confirm_delete: confirm_delete.unwrap_or(defaults.confirm_delete),
        })
    }

    async fn update_settings(&self, settings: &Settings) -> InternalResult<Settings> {
        let session = self.session()?;
        let binding = self.binding().await?;

        self.upsert_settings(settings, &binding, &session).await?;
        Ok(*settings)
    }

    async fn clear_all(&self) -> InternalResult<Vec<Category>> {
        let session = self.session()?;
        let binding = self.binding().await?;
        let workspace_filter = [("workspace_id", format!("eq.{}", binding.workspace_id))];

        for table in ["tasks", "categories", "settings"] {
            self.execute(
                self.http.delete(self.table(table)).query(&workspace_filter),
                &session,
            )
            .await?;
        }

        let categories = fresh_default_categories();
        for category in categories.iter() {
            self.insert_category(category, &binding, &session).await?;
        }

        info!(workspace_id = %binding.workspace_id, "workspace data cleared");
        Ok(categories)
    }
}
