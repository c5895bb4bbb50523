use chrono::{Local, NaiveDate};
use rocket::serde::json::Json;
use rocket::{get, post, State};
use serde::Serialize;

use crate::internal_error::{InternalError, InternalResult};
use crate::workspace::data::User;
use crate::AppState;

use super::data::*;
use super::migrate::{migrate_local_to_remote, MigrationReport};
use super::repository::RepositoryStatus;
use super::visibility::{marked_days, week_of, DayAgenda, DayView};

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(flatten)]
    pub repository: RepositoryStatus,
    pub backend_configured: bool,
    pub signed_in: bool,
    pub user: User,
}

#[derive(Serialize, Debug)]
pub struct DayResponse {
    #[serde(flatten)]
    pub agenda: DayAgenda,
    pub week: Vec<NaiveDate>,
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn parse_date(date: &str) -> InternalResult<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| InternalError::invalid(format!("bad date {:?}", date)))
}

fn parse_view(view: &str) -> InternalResult<DayView> {
    match view {
        "planner" => Ok(DayView::Planner),
        "calendar" => Ok(DayView::Calendar),
        other => Err(InternalError::invalid(format!("unknown view {:?}", other))),
    }
}

#[get("/status")]
pub fn get_status(state: &State<AppState>) -> InternalResult<Json<StatusResponse>> {
    Ok(Json(StatusResponse {
        repository: state.repository.status()?,
        backend_configured: state.auth.is_some(),
        signed_in: state.session().is_some(),
        user: state.workspace.current_user()?,
    }))
}

#[get("/tasks")]
pub fn get_tasks(state: &State<AppState>) -> InternalResult<Json<Vec<Task>>> {
    Ok(Json(state.repository.tasks()?))
}

#[get("/day?<date>&<q>&<view>")]
pub fn get_day(
    date: Option<&str>,
    q: Option<&str>,
    view: Option<&str>,
    state: &State<AppState>,
) -> InternalResult<Json<DayResponse>> {
    let today = today();
    let date = date.map(parse_date).transpose()?.unwrap_or(today);
    let view = view.map(parse_view).transpose()?.unwrap_or_default();
    let week = week_of(date)
        .ok_or_else(|| InternalError::invalid(format!("date {} is out of range", date)))?;

    let tasks = state.repository.tasks()?;
    let agenda = DayAgenda::build(&tasks, date, q.unwrap_or(""), view, today);

    Ok(Json(DayResponse { agenda, week }))
}

#[get("/calendar_marks?<year>&<month>")]
pub fn get_calendar_marks(
    year: i32,
    month: u32,
    state: &State<AppState>,
) -> InternalResult<Json<Vec<NaiveDate>>> {
    if !(1..=12).contains(&month) {
        return Err(InternalError::invalid(format!("bad month {}", month)));
    }

    let tasks = state.repository.tasks()?;
    Ok(Json(marked_days(&tasks, year, month)))
}

#[post("/add_task", format = "json", data = "<task>")]
pub async fn add_task(task: Json<NewTask>, state: &State<AppState>) -> InternalResult<Json<Task>> {
    let author = state.workspace.author()?;
    let task = state.repository.add_task(task.into_inner(), &author).await?;

    Ok(Json(task))
}

#[post("/update_task", format = "json", data = "<update_task_request>")]
pub async fn update_task(
    update_task_request: Json<UpdateTaskRequest>,
    state: &State<AppState>,
) -> InternalResult<Json<Task>> {
    let UpdateTaskRequest { task_id, patch } = update_task_request.into_inner();

    state.repository.update_task(&task_id, patch).await.map(Json)
}

#[post("/edit_task", format = "json", data = "<edit_task_request>")]
pub async fn edit_task(
    edit_task_request: Json<EditTaskRequest>,
    state: &State<AppState>,
) -> InternalResult<Json<Task>> {
    let EditTaskRequest { task_id, task } = edit_task_request.into_inner();
    let patch = TaskPatch::from_edit(task)?;

    state.repository.update_task(&task_id, patch).await.map(Json)
}

#[post("/toggle_task", format = "json", data = "<toggle_task_request>")]
pub async fn toggle_task(
    toggle_task_request: Json<ToggleTaskRequest>,
    state: &State<AppState>,
) -> InternalResult<Json<Task>> {
    let date = toggle_task_request.date.unwrap_or_else(today);

    state
        .repository
        .toggle_task(&toggle_task_request.task_id, date)
        .await
        .map(Json)
}

#[post("/delete_task", format = "json", data = "<delete_task_request>")]
pub async fn delete_task(
    delete_task_request: Json<DeleteTaskRequest>,
    state: &State<AppState>,
) -> InternalResult<()> {
    state.repository.delete_task(&delete_task_request.task_id).await
}

#[get("/categories")]
pub fn get_categories(state: &State<AppState>) -> InternalResult<Json<Vec<Category>>> {
    Ok(Json(state.repository.snapshot()?.categories))
}

#[derive(Serialize, Debug)]
pub struct PaletteColor {
    pub name: &'static str,
    pub color: &'static str,
}

#[get("/category_colors")]
pub fn get_category_colors() -> Json<Vec<PaletteColor>> {
    Json(
        CATEGORY_COLORS
            .iter()
            .map(|&(name, color)| PaletteColor { name, color })
            .collect(),
    )
}

#[post("/add_category", format = "json", data = "<category>")]
pub async fn add_category(
    category: Json<NewCategory>,
    state: &State<AppState>,
) -> InternalResult<Json<Category>> {
    state
        .repository
        .add_category(category.into_inner())
        .await
        .map(Json)
}

#[post("/delete_category", format = "json", data = "<delete_category_request>")]
pub async fn delete_category(
    delete_category_request: Json<DeleteCategoryRequest>,
    state: &State<AppState>,
) -> InternalResult<()> {
    state
        .repository
        .delete_category(&delete_category_request.category_id)
        .await
}

#[get("/settings")]
pub fn get_settings(state: &State<AppState>) -> InternalResult<Json<Settings>> {
    Ok(Json(state.repository.snapshot()?.settings))
}

#[post("/set_settings", format = "json", data = "<settings>")]
pub async fn set_settings(
    settings: Json<Settings>,
    state: &State<AppState>,
) -> InternalResult<Json<Settings>> {
    state
        .repository
        .update_settings(settings.into_inner())
        .await
        .map(Json)
}

#[post("/clear_all")]
pub async fn clear_all(state: &State<AppState>) -> InternalResult<Json<PlannerSnapshot>> {
    state.repository.clear_all().await.map(Json)
}

/// Copies whatever local storage holds into the signed-in user's backend
/// workspace, then reloads from the backend.
#[post("/migrate_local")]
pub async fn migrate_local(state: &State<AppState>) -> InternalResult<Json<MigrationReport>> {
    let remote = state.remote()?.clone();
    if state.session().is_none() {
        return Err(InternalError::NotSignedIn);
    }

    let report = migrate_local_to_remote(state.repository.local(), remote.as_ref()).await?;
    if !report.nothing_to_migrate {
        state.repository.load(true).await?;
    }

    Ok(Json(report))
}
