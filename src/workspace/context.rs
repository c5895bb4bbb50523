//! Workspaces and members of the current user, persisted per user in local
//! storage.

use chrono::Utc;
use tracing::{debug, info};

use std::sync::{Mutex, MutexGuard};

use crate::internal_error::{InternalError, InternalResult};
use crate::local_storage::{current_workspace_key, members_key, workspaces_key, LocalStorage};
use crate::planner::data::TaskAuthor;

use super::data::*;

struct WorkspaceState {
    current_user: User,
    workspaces: Vec<Workspace>,
    current_workspace_id: WorkspaceID,
    members: Vec<User>,
}

impl WorkspaceState {
    fn load(storage: &LocalStorage, user: User) -> InternalResult<WorkspaceState> {
        let mut workspaces: Vec<Workspace> = storage
            .read_json(&workspaces_key(&user.id))?
            .unwrap_or_default();
        if workspaces.is_empty() {
            debug!(user_id = %user.id, "no stored workspaces, creating personal one");
            workspaces.push(Workspace::personal_for(&user));
        }

        let stored_current: Option<WorkspaceID> =
            storage.read_json(&current_workspace_key(&user.id))?;
        let current_workspace_id = stored_current
            .filter(|id| workspaces.iter().any(|w| &w.id == id))
            .unwrap_or_else(|| workspaces[0].id.clone());

        let mut members: Vec<User> = storage.read_json(&members_key(&user.id))?.unwrap_or_default();
        match members.iter_mut().find(|member| member.id == user.id) {
            Some(record) => *record = user.clone(),
            None => members.insert(0, user.clone()),
        }

        Ok(WorkspaceState {
            current_user: user,
            workspaces,
            current_workspace_id,
            members,
        })
    }

    fn persist(&self, storage: &LocalStorage) -> InternalResult<()> {
        let user_id = &self.current_user.id;

        storage.write_json(&workspaces_key(user_id), &self.workspaces)?;
        storage.write_json(&current_workspace_key(user_id), &self.current_workspace_id)?;
        storage.write_json(&members_key(user_id), &self.members)
    }

    fn current_index(&self) -> usize {
        self.workspaces
            .iter()
            .position(|w| w.id == self.current_workspace_id)
            .unwrap_or(0)
    }

    fn current(&self) -> &Workspace {
        &self.workspaces[self.current_index()]
    }

    fn is_owner(&self) -> bool {
        self.current_user.id == self.current().owner_id
    }

    fn require_owner(&self) -> InternalResult<()> {
        if self.is_owner() {
            Ok(())
        } else {
            Err(InternalError::NotOwner)
        }
    }

    fn members(&self) -> Vec<User> {
        let workspace = self.current();
        self.members
            .iter()
            .filter(|member| workspace.has_member(&member.id))
            .cloned()
            .collect()
    }
}

pub struct WorkspaceContext {
    storage: LocalStorage,
    state: Mutex<WorkspaceState>,
}

impl WorkspaceContext {
    pub fn new(storage: LocalStorage, user: User) -> InternalResult<WorkspaceContext> {
        let state = WorkspaceState::load(&storage, user)?;
        state.persist(&storage)?;

        Ok(WorkspaceContext {
            storage,
            state: Mutex::new(state),
        })
    }

    fn state(&self) -> InternalResult<MutexGuard<'_, WorkspaceState>> {
        Ok(self.state.lock()?)
    }

    /// Replaces the whole context with the stored state of `user`.
    pub fn switch_user(&self, user: User) -> InternalResult<()> {
        let loaded = WorkspaceState::load(&self.storage, user)?;
        loaded.persist(&self.storage)?;

        info!(user_id = %loaded.current_user.id, "workspace user switched");
        *self.state()? = loaded;
        Ok(())
    }

    pub fn current_user(&self) -> InternalResult<User> {
        Ok(self.state()?.current_user.clone())
    }

    pub fn current_workspace(&self) -> InternalResult<Workspace> {
        Ok(self.state()?.current().clone())
    }

    pub fn workspaces(&self) -> InternalResult<Vec<Workspace>> {
        Ok(self.state()?.workspaces.clone())
    }

    /// Members listed by the current workspace.
    pub fn members(&self) -> InternalResult<Vec<User>> {
        Ok(self.state()?.members())
    }

    pub fn member_by_id(&self, id: &str) -> InternalResult<Option<User>> {
        Ok(self
            .state()?
            .members
            .iter()
            .find(|member| member.id == id)
            .cloned())
    }

    pub fn is_owner(&self) -> InternalResult<bool> {
        Ok(self.state()?.is_owner())
    }

    pub fn can_create_for_others(&self) -> InternalResult<bool> {
        let state = self.state()?;
        Ok(state.current_user.role == Role::Owner || state.is_owner())
    }

    /// Author stamp for tasks created by the current user.
    pub fn author(&self) -> InternalResult<TaskAuthor> {
        let state = self.state()?;

        Ok(TaskAuthor {
            user_id: state.current_user.id.clone(),
            workspace_id: state.current_workspace_id.clone(),
        })
    }

    pub fn view(&self) -> InternalResult<WorkspaceView> {
        let state = self.state()?;

        Ok(WorkspaceView {
            current_user: state.current_user.clone(),
            current_workspace: state.current().clone(),
            workspaces: state.workspaces.clone(),
            members: state.members(),
            is_owner: state.is_owner(),
            can_create_for_others: state.current_user.role == Role::Owner || state.is_owner(),
        })
    }

    pub fn create_workspace(&self, name: &str, kind: WorkspaceType) -> InternalResult<Workspace> {
        let name = name.trim();
        if name.is_empty() {
            return Err(InternalError::invalid("workspace name is empty"));
        }

        let mut state = self.state()?;
        let workspace = Workspace {
            id: format!("workspace-{}", uuid::Uuid::new_v4()),
            name: name.to_string(),
            kind,
            owner_id: state.current_user.id.clone(),
            member_ids: vec![state.current_user.id.clone()],
            created_at: Utc::now(),
        };

        state.workspaces.push(workspace.clone());
        state.current_workspace_id = workspace.id.clone();
        state.persist(&self.storage)?;

        info!(workspace_id = %workspace.id, "workspace created");
        Ok(workspace)
    }

    pub fn switch_workspace(&self, id: &str) -> InternalResult<Workspace> {
        let mut state = self.state()?;

        let workspace = state
            .workspaces
            .iter()
            .find(|w| w.id == id)
            .cloned()
            .ok_or_else(|| InternalError::not_found(format!("workspace {}", id)))?;

        state.current_workspace_id = workspace.id.clone();
        state.persist(&self.storage)?;

        Ok(workspace)
    }

    pub fn add_member(&self, name: &str, email: &str) -> InternalResult<User> {
        let (name, email) = (name.trim(), email.trim());
        if name.is_empty() || email.is_empty() {
            return Err(InternalError::invalid("member name and email are required"));
        }

        let mut state = self.state()?;
        state.require_owner()?;

        let member = User {
            id: format!("user-{}", uuid::Uuid::new_v4()),
            name: name.to_string(),
            email: email.to_string(),
            avatar: None,
            role: Role::Member,
        };

        let index = state.current_index();
        state.members.push(member.clone());
        state.workspaces[index].member_ids.push(member.id.clone());
        state.persist(&self.storage)?;

        info!(member_id = %member.id, "member added");
        Ok(member)
    }

    /// Drops `id` from the current workspace. The member record itself is
    /// kept, and the owner cannot be removed.
    pub fn remove_member(&self, id: &str) -> InternalResult<()> {
        let mut state = self.state()?;
        state.require_owner()?;

        let index = state.current_index();
        if state.workspaces[index].owner_id == id {
            debug!(member_id = %id, "refusing to remove workspace owner");
            return Ok(());
        }

        state.workspaces[index].member_ids.retain(|member_id| member_id != id);
        state.persist(&self.storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> WorkspaceContext {
        WorkspaceContext::new(LocalStorage::in_memory().unwrap(), User::local()).unwrap()
    }

    fn someone() -> User {
        User {
            id: "u2".into(),
            name: "ana".into(),
            email: "ana@example.com".into(),
            avatar: None,
            role: Role::Member,
        }
    }

    #[test]
    fn starts_in_personal_workspace() {
        let context = context();
        let view = context.view().unwrap();

        assert_eq!(view.current_workspace.id, LOCAL_WORKSPACE_ID);
        assert_eq!(view.members, vec![User::local()]);
        assert!(view.is_owner);
        assert!(view.can_create_for_others);
        assert_eq!(
            context.author().unwrap(),
            TaskAuthor {
                user_id: LOCAL_USER_ID.into(),
                workspace_id: LOCAL_WORKSPACE_ID.into(),
            }
        );
    }

    #[test]
    fn created_workspace_becomes_current() {
        let context = context();
        let workspace = context.create_workspace(" Família Silva ", WorkspaceType::Family).unwrap();

        assert_eq!(workspace.name, "Família Silva");
        assert_eq!(context.current_workspace().unwrap().id, workspace.id);
        assert_eq!(context.workspaces().unwrap().len(), 2);
        assert!(context.create_workspace("  ", WorkspaceType::Family).is_err());
    }

    #[test]
    fn switching_to_unknown_workspace_fails() {
        let context = context();
        assert!(matches!(
            context.switch_workspace("nope"),
            Err(InternalError::NotFound(_))
        ));
        assert!(context.switch_workspace(LOCAL_WORKSPACE_ID).is_ok());
    }

    #[test]
    fn members_are_scoped_to_current_workspace() {
        let context = context();
        let member = context.add_member("João", "joao@example.com").unwrap();
        assert_eq!(member.role, Role::Member);
        assert_eq!(context.members().unwrap().len(), 2);

        context.create_workspace("Empresa", WorkspaceType::Business).unwrap();
        assert_eq!(context.members().unwrap().len(), 1);
        assert!(context.member_by_id(&member.id).unwrap().is_some());
    }

    #[test]
    fn removal_keeps_record_and_spares_owner() {
        let context = context();
        let member = context.add_member("João", "joao@example.com").unwrap();

        context.remove_member(LOCAL_USER_ID).unwrap();
        assert!(context.current_workspace().unwrap().has_member(LOCAL_USER_ID));

        context.remove_member(&member.id).unwrap();
        assert!(!context.current_workspace().unwrap().has_member(&member.id));
        assert!(context.member_by_id(&member.id).unwrap().is_some());
    }

    #[test]
    fn member_fields_are_required() {
        let context = context();
        assert!(matches!(
            context.add_member("", "x@example.com"),
            Err(InternalError::InvalidInput(_))
        ));
    }

    #[test]
    fn non_owners_cannot_manage_members() {
        let storage = LocalStorage::in_memory().unwrap();
        let shared = Workspace {
            owner_id: "someone-else".into(),
            member_ids: vec!["someone-else".into(), "u2".into()],
            ..Workspace::personal_for(&someone())
        };
        storage.write_json(&workspaces_key("u2"), &vec![shared]).unwrap();

        let context = WorkspaceContext::new(storage, someone()).unwrap();
        assert!(!context.is_owner().unwrap());
        assert!(!context.can_create_for_others().unwrap());
        assert!(matches!(
            context.add_member("x", "x@example.com"),
            Err(InternalError::NotOwner)
        ));
        assert!(matches!(context.remove_member("u2"), Err(InternalError::NotOwner)));
    }

    #[test]
    fn state_survives_user_switches() {
        let storage = LocalStorage::in_memory().unwrap();
        let context = WorkspaceContext::new(storage.clone(), User::local()).unwrap();
        let workspace = context.create_workspace("Casa", WorkspaceType::Family).unwrap();

        context.switch_user(someone()).unwrap();
        assert_eq!(context.current_user().unwrap().id, "u2");
        assert_eq!(context.workspaces().unwrap().len(), 1);

        context.switch_user(User::local()).unwrap();
        assert_eq!(context.current_workspace().unwrap().id, workspace.id);

        let reopened = WorkspaceContext::new(storage, User::local()).unwrap();
        assert_eq!(reopened.workspaces().unwrap().len(), 2);
    }
}
