use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::data::AuthUser;

pub type UserID = String;
pub type WorkspaceID = String;

pub const LOCAL_USER_ID: &str = "local-user";
pub const LOCAL_WORKSPACE_ID: &str = "workspace-local";
const DEFAULT_WORKSPACE_NAME: &str = "Meu Espaço";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Member,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserID,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub role: Role,
}

impl User {
    pub fn local() -> User {
        User {
            id: LOCAL_USER_ID.to_string(),
            name: "Usuário Local".to_string(),
            email: "local@planner.com".to_string(),
            avatar: None,
            role: Role::Owner,
        }
    }

    /// Workspace identity of a signed-in account. The display name is the
    /// local part of the email.
    pub fn from_auth(user: &AuthUser) -> User {
        let email = user.email.clone().unwrap_or_default();
        let name = match email.split('@').next() {
            Some(local_part) if !local_part.is_empty() => local_part.to_string(),
            _ => "Usuário".to_string(),
        };

        User {
            id: user.id.clone(),
            name,
            email,
            avatar: None,
            role: Role::Owner,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceType {
    Family,
    Business,
    Personal,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: WorkspaceID,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: WorkspaceType,
    pub owner_id: UserID,
    pub member_ids: Vec<UserID>,
    pub created_at: DateTime<Utc>,
}

impl Workspace {
    /// The personal workspace a user starts with.
    pub fn personal_for(user: &User) -> Workspace {
        let id = if user.id == LOCAL_USER_ID {
            LOCAL_WORKSPACE_ID.to_string()
        } else {
            format!("workspace-{}", uuid::Uuid::new_v4())
        };

        Workspace {
            id,
            name: DEFAULT_WORKSPACE_NAME.to_string(),
            kind: WorkspaceType::Personal,
            owner_id: user.id.clone(),
            member_ids: vec![user.id.clone()],
            created_at: Utc::now(),
        }
    }

    pub fn has_member(&self, id: &str) -> bool {
        self.member_ids.iter().any(|member_id| member_id == id)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceView {
    pub current_user: User,
    pub current_workspace: Workspace,
    pub workspaces: Vec<Workspace>,
    pub members: Vec<User>,
    pub is_owner: bool,
    pub can_create_for_others: bool,
}

#[derive(Deserialize, Debug)]
pub struct CreateWorkspaceRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: WorkspaceType,
}

#[derive(Deserialize, Debug)]
pub struct SwitchWorkspaceRequest {
    pub workspace_id: WorkspaceID,
}

#[derive(Deserialize, Debug)]
pub struct AddMemberRequest {
    pub name: String,
    pub email: String,
}

#[derive(Deserialize, Debug)]
pub struct RemoveMemberRequest {
    pub member_id: UserID,
}
