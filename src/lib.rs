pub mod auth;
pub mod config;
pub mod data;
pub mod internal_error;
pub mod local_storage;
pub mod planner;
pub mod workspace;

use rocket::fs::FileServer;
use rocket::{routes, Build, Rocket};
use tracing::{info, warn};

use std::sync::Arc;

use auth::client::{AuthClient, SessionReceiver};
use auth::data::Session;
use config::AppConfig;
use data::{SharedAuth, SharedRepository, SharedStore, SharedWorkspace};
use internal_error::{InternalError, InternalResult};
use local_storage::LocalStorage;
use planner::remote::RemoteStore;
use planner::repository::{PlannerRepository, RepositoryOptions};
use planner::store::LocalStore;
use workspace::context::WorkspaceContext;
use workspace::data::User;

/// Everything the request handlers share. Rocket manages one instance.
#[derive(Clone)]
pub struct AppState {
    pub repository: SharedRepository,
    pub workspace: SharedWorkspace,
    pub auth: Option<SharedAuth>,
    pub remote: Option<SharedStore>,
}

impl AppState {
    pub fn auth(&self) -> InternalResult<&AuthClient> {
        self.auth
            .as_deref()
            .ok_or(InternalError::BackendNotConfigured)
    }

    pub fn remote(&self) -> InternalResult<&SharedStore> {
        self.remote.as_ref().ok_or(InternalError::BackendNotConfigured)
    }

    pub fn session(&self) -> Option<Session> {
        self.auth.as_ref().and_then(|auth| auth.current_session())
    }
}

fn user_for(session: Option<&Session>) -> User {
    session
        .map(|session| User::from_auth(&session.user))
        .unwrap_or_else(User::local)
}

/// Opens local storage, restores the auth session when a backend is
/// configured and performs the first planner load.
pub async fn bootstrap(config: &AppConfig) -> InternalResult<AppState> {
    let storage = LocalStorage::open(&config.database)?;
    bootstrap_with_storage(config, storage).await
}

pub async fn bootstrap_with_storage(
    config: &AppConfig,
    storage: LocalStorage,
) -> InternalResult<AppState> {
    let local = Arc::new(LocalStore::new(storage.clone()));
    let http = reqwest::Client::new();

    let (auth, remote) = match config.backend() {
        Some(backend) => {
            info!(url = %backend.url, "using hosted backend");
            let auth = Arc::new(AuthClient::new(http.clone(), backend.clone(), storage.clone()));
            let remote: SharedStore = Arc::new(RemoteStore::new(http, backend, auth.subscribe()));
            (Some(auth), Some(remote))
        }
        None => {
            info!("no backend configured, running in local mode");
            (None, None)
        }
    };

    let session = match &auth {
        Some(auth) => auth.restore_session().await,
        None => None,
    };

    let repository = Arc::new(PlannerRepository::new(
        local,
        remote.clone(),
        RepositoryOptions::from_config(config),
    ));
    let workspace = Arc::new(WorkspaceContext::new(storage, user_for(session.as_ref()))?);

    repository.load(session.is_some()).await?;

    if let Some(auth) = &auth {
        tokio::spawn(watch_sessions(
            auth.subscribe(),
            repository.clone(),
            workspace.clone(),
        ));
    }

    Ok(AppState {
        repository,
        workspace,
        auth,
        remote,
    })
}

/// Follows sign-in and sign-out: switches the workspace user and reloads the
/// planner for each new session value.
async fn watch_sessions(
    mut sessions: SessionReceiver,
    repository: SharedRepository,
    workspace: SharedWorkspace,
) {
    while sessions.changed().await.is_ok() {
        let session = sessions.borrow_and_update().clone();

        if let Err(e) = workspace.switch_user(user_for(session.as_ref())) {
            warn!(error = %e, "could not switch workspace user");
        }

        match repository.load(session.is_some()).await {
            Ok(outcome) => info!(?outcome, signed_in = session.is_some(), "planner reloaded"),
            Err(e) => warn!(error = %e, "planner reload failed"),
        }
    }
}

pub fn build_rocket(state: AppState, config: &AppConfig) -> Rocket<Build> {
    let rocket = rocket::build()
        .manage(state)
        .mount(
            "/api",
            routes![
                planner::endpoints::get_status,
                planner::endpoints::get_tasks,
                planner::endpoints::get_day,
                planner::endpoints::get_calendar_marks,
                planner::endpoints::add_task,
                planner::endpoints::update_task,
                planner::endpoints::edit_task,
                planner::endpoints::toggle_task,
                planner::endpoints::delete_task,
                planner::endpoints::get_categories,
                planner::endpoints::get_category_colors,
                planner::endpoints::add_category,
                planner::endpoints::delete_category,
                planner::endpoints::get_settings,
                planner::endpoints::set_settings,
                planner::endpoints::clear_all,
                planner::endpoints::migrate_local,
                workspace::endpoints::get_workspace,
                workspace::endpoints::create_workspace,
                workspace::endpoints::switch_workspace,
                workspace::endpoints::add_member,
                workspace::endpoints::remove_member,
                auth::endpoints::sign_in,
                auth::endpoints::sign_up,
                auth::endpoints::sign_out,
                auth::endpoints::reset_password,
            ],
        );

    match &config.static_dir {
        Some(static_dir) => rocket.mount("/", FileServer::from(static_dir).rank(15)),
        None => rocket,
    }
}
