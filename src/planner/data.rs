use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use std::collections::BTreeSet;

use crate::internal_error::{InternalError, InternalResult};

pub type TaskID = String;
pub type CategoryID = String;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    OneOff,
    Permanent,
    Delivery,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskID,
    pub text: String,
    #[serde(default)]
    pub is_permanent: bool,
    #[serde(default)]
    pub is_delivery: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed_dates: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<CategoryID>,
    #[serde(default)]
    pub assigned_to_id: String,
    #[serde(default)]
    pub created_by_id: String,
    #[serde(default)]
    pub workspace_id: String,
}

impl Task {
    /// The permanent flag wins over the delivery flag, and a delivery task
    /// without a deadline behaves like a one-off task.
    pub fn kind(&self) -> TaskKind {
        if self.is_permanent {
            TaskKind::Permanent
        } else if self.is_delivery && self.delivery_date.is_some() {
            TaskKind::Delivery
        } else {
            TaskKind::OneOff
        }
    }

    pub fn is_completed_on(&self, date: NaiveDate) -> bool {
        match self.kind() {
            TaskKind::Permanent => self.completed_dates.contains(&date),
            TaskKind::OneOff | TaskKind::Delivery => self.completed,
        }
    }

    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(text) = &patch.text {
            self.text = text.clone();
        }
        if let Some(is_permanent) = patch.is_permanent {
            self.is_permanent = is_permanent;
        }
        if let Some(is_delivery) = patch.is_delivery {
            self.is_delivery = is_delivery;
        }
        if let Some(date) = patch.date {
            self.date = date;
        }
        if let Some(delivery_date) = patch.delivery_date {
            self.delivery_date = delivery_date;
        }
        if let Some(completed_dates) = &patch.completed_dates {
            self.completed_dates = completed_dates.clone();
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if let Some(category_id) = &patch.category_id {
            self.category_id = category_id.clone();
        }
        if let Some(assigned_to_id) = &patch.assigned_to_id {
            self.assigned_to_id = assigned_to_id.clone();
        }
    }
}

/// Who is creating a task and where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAuthor {
    pub user_id: String,
    pub workspace_id: String,
}

/// The add/edit task form.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub text: String,
    #[serde(default)]
    pub is_permanent: bool,
    #[serde(default)]
    pub is_delivery: bool,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub delivery_date: Option<NaiveDate>,
    #[serde(default)]
    pub category_id: Option<CategoryID>,
    #[serde(default)]
    pub assigned_to_id: Option<String>,
}

struct NormalizedForm {
    text: String,
    is_permanent: bool,
    is_delivery: bool,
    date: Option<NaiveDate>,
    delivery_date: Option<NaiveDate>,
}

impl NewTask {
    fn normalize(&self) -> InternalResult<NormalizedForm> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(InternalError::invalid("task text is empty"));
        }

        let form = if self.is_permanent {
            NormalizedForm {
                text: text.to_string(),
                is_permanent: true,
                is_delivery: false,
                date: None,
                delivery_date: None,
            }
        } else if self.is_delivery {
            let delivery_date = self
                .delivery_date
                .ok_or_else(|| InternalError::invalid("delivery task without a delivery date"))?;

            NormalizedForm {
                text: text.to_string(),
                is_permanent: false,
                is_delivery: true,
                date: None,
                delivery_date: Some(delivery_date),
            }
        } else {
            let date = self
                .date
                .ok_or_else(|| InternalError::invalid("one-off task without a date"))?;

            NormalizedForm {
                text: text.to_string(),
                is_permanent: false,
                is_delivery: false,
                date: Some(date),
                delivery_date: None,
            }
        };

        Ok(form)
    }

    pub fn into_task(self, id: TaskID, author: &TaskAuthor) -> InternalResult<Task> {
        let form = self.normalize()?;

        Ok(Task {
            id,
            text: form.text,
            is_permanent: form.is_permanent,
            is_delivery: form.is_delivery,
            date: form.date,
            delivery_date: form.delivery_date,
            completed_dates: BTreeSet::new(),
            completed: false,
            category_id: self.category_id,
            assigned_to_id: self
                .assigned_to_id
                .unwrap_or_else(|| author.user_id.clone()),
            created_by_id: author.user_id.clone(),
            workspace_id: author.workspace_id.clone(),
        })
    }
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial update of a task. For the nullable fields `None` leaves the value
/// alone and `Some(None)` clears it.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_permanent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_delivery: Option<bool>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<Option<NaiveDate>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub delivery_date: Option<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_dates: Option<BTreeSet<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub category_id: Option<Option<CategoryID>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to_id: Option<String>,
}

impl TaskPatch {
    /// Patch produced by the edit dialog: the kind fields are rewritten as a
    /// group, completion state is left untouched.
    pub fn from_edit(form: NewTask) -> InternalResult<TaskPatch> {
        let normalized = form.normalize()?;

        Ok(TaskPatch {
            text: Some(normalized.text),
            is_permanent: Some(normalized.is_permanent),
            is_delivery: Some(normalized.is_delivery),
            date: Some(normalized.date),
            delivery_date: Some(normalized.delivery_date),
            category_id: Some(form.category_id),
            assigned_to_id: form.assigned_to_id,
            ..TaskPatch::default()
        })
    }

    pub fn validate(&self) -> InternalResult<()> {
        match &self.text {
            Some(text) if text.trim().is_empty() => {
                Err(InternalError::invalid("task text is empty"))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: CategoryID,
    pub name: String,
    pub color: String,
}

pub const CATEGORY_COLORS: [(&str, &str); 8] = [
    ("Blue", "bg-blue-500 text-white"),
    ("Orange", "bg-orange-500 text-white"),
    ("Green", "bg-emerald-500 text-white"),
    ("Purple", "bg-purple-500 text-white"),
    ("Rose", "bg-rose-500 text-white"),
    ("Indigo", "bg-indigo-500 text-white"),
    ("Gray", "bg-gray-500 text-white"),
    ("Amber", "bg-amber-500 text-white"),
];

const DEFAULT_CATEGORIES: [(&str, &str, &str); 3] = [
    ("1", "Trabalho", "bg-blue-500 text-white"),
    ("2", "Pessoal", "bg-emerald-500 text-white"),
    ("3", "Saúde", "bg-rose-500 text-white"),
];

/// Default categories with the fixed ids used by local storage.
pub fn default_categories() -> Vec<Category> {
    DEFAULT_CATEGORIES
        .iter()
        .map(|(id, name, color)| Category {
            id: id.to_string(),
            name: name.to_string(),
            color: color.to_string(),
        })
        .collect()
}

/// Default categories with freshly generated ids, for stores that need
/// globally unique keys.
pub fn fresh_default_categories() -> Vec<Category> {
    default_categories()
        .into_iter()
        .map(|category| Category {
            id: new_id(),
            ..category
        })
        .collect()
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NewCategory {
    pub name: String,
    pub color: String,
}

impl NewCategory {
    pub fn into_category(self, id: CategoryID) -> InternalResult<Category> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(InternalError::invalid("category name is empty"));
        }

        Ok(Category {
            id,
            name: name.to_string(),
            color: self.color,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub dark_mode: bool,
    pub show_completed: bool,
    pub confirm_delete: bool,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            dark_mode: false,
            show_completed: true,
            confirm_delete: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlannerSnapshot {
    pub tasks: Vec<Task>,
    pub categories: Vec<Category>,
    pub settings: Settings,
}

impl Default for PlannerSnapshot {
    fn default() -> PlannerSnapshot {
        PlannerSnapshot {
            tasks: vec![],
            categories: default_categories(),
            settings: Settings::default(),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct UpdateTaskRequest {
    pub task_id: TaskID,
    pub patch: TaskPatch,
}

#[derive(Deserialize, Debug)]
pub struct EditTaskRequest {
    pub task_id: TaskID,
    pub task: NewTask,
}

#[derive(Deserialize, Debug)]
pub struct ToggleTaskRequest {
    pub task_id: TaskID,
    pub date: Option<NaiveDate>,
}

#[derive(Deserialize, Debug)]
pub struct DeleteTaskRequest {
    pub task_id: TaskID,
}

#[derive(Deserialize, Debug)]
pub struct DeleteCategoryRequest {
    pub category_id: CategoryID,
}
