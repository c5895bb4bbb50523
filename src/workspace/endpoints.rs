use rocket::serde::json::Json;
use rocket::{get, post, State};

use crate::internal_error::InternalResult;
use crate::AppState;

use super::data::*;

#[get("/workspace")]
pub fn get_workspace(state: &State<AppState>) -> InternalResult<Json<WorkspaceView>> {
    Ok(Json(state.workspace.view()?))
}

#[post("/create_workspace", format = "json", data = "<create_workspace_request>")]
pub fn create_workspace(
    create_workspace_request: Json<CreateWorkspaceRequest>,
    state: &State<AppState>,
) -> InternalResult<Json<WorkspaceView>> {
    state
        .workspace
        .create_workspace(&create_workspace_request.name, create_workspace_request.kind)?;

    Ok(Json(state.workspace.view()?))
}

#[post("/switch_workspace", format = "json", data = "<switch_workspace_request>")]
pub fn switch_workspace(
    switch_workspace_request: Json<SwitchWorkspaceRequest>,
    state: &State<AppState>,
) -> InternalResult<Json<WorkspaceView>> {
    state
        .workspace
        .switch_workspace(&switch_workspace_request.workspace_id)?;

    Ok(Json(state.workspace.view()?))
}

#[post("/add_member", format = "json", data = "<add_member_request>")]
pub fn add_member(
    add_member_request: Json<AddMemberRequest>,
    state: &State<AppState>,
) -> InternalResult<Json<User>> {
    let member = state
        .workspace
        .add_member(&add_member_request.name, &add_member_request.email)?;

    Ok(Json(member))
}

#[post("/remove_member", format = "json", data = "<remove_member_request>")]
pub fn remove_member(
    remove_member_request: Json<RemoveMemberRequest>,
    state: &State<AppState>,
) -> InternalResult<Json<WorkspaceView>> {
    state
        .workspace
        .remove_member(&remove_member_request.member_id)?;

    Ok(Json(state.workspace.view()?))
}
