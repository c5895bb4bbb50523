use rusqlite::Connection;
use std::sync::{Arc, Mutex};

use crate::auth::client::AuthClient;
use crate::planner::repository::PlannerRepository;
use crate::planner::store::PlannerStore;
use crate::workspace::context::WorkspaceContext;

pub type DBConnection = Arc<Mutex<Connection>>;

pub type SharedRepository = Arc<PlannerRepository>;
pub type SharedWorkspace = Arc<WorkspaceContext>;
pub type SharedAuth = Arc<AuthClient>;
pub type SharedStore = Arc<dyn PlannerStore>;
