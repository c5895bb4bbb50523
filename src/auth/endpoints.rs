use rocket::serde::json::Json;
use rocket::{post, State};

use crate::internal_error::InternalResult;
use crate::AppState;

use super::data::*;

#[post("/sign_in", format = "json", data = "<credentials>")]
pub async fn sign_in(
    credentials: Json<Credentials>,
    state: &State<AppState>,
) -> InternalResult<Json<AuthUser>> {
    let session = state.auth()?.sign_in(&credentials).await?;

    Ok(Json(session.user))
}

#[post("/sign_up", format = "json", data = "<credentials>")]
pub async fn sign_up(
    credentials: Json<Credentials>,
    state: &State<AppState>,
) -> InternalResult<Json<SignUpOutcome>> {
    state.auth()?.sign_up(&credentials).await.map(Json)
}

#[post("/sign_out")]
pub async fn sign_out(state: &State<AppState>) -> InternalResult<()> {
    state.auth()?.sign_out().await
}

#[post("/reset_password", format = "json", data = "<reset_password_request>")]
pub async fn reset_password(
    reset_password_request: Json<ResetPasswordRequest>,
    state: &State<AppState>,
) -> InternalResult<()> {
    state
        .auth()?
        .reset_password(
            &reset_password_request.email,
            reset_password_request.redirect_to.as_deref(),
        )
        .await
}
