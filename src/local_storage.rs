//! Key/value storage area standing in for the browser's local storage.
//!
//! Every value is a JSON document stored under a string key. Writers always
//! replace the whole value; there is no versioning and the last writer wins.

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::data::DBConnection;
use crate::internal_error::InternalResult;

pub const TASKS_KEY: &str = "agenda-tasks";
pub const CATEGORIES_KEY: &str = "agenda-categories";
pub const SETTINGS_KEY: &str = "agenda-settings";
pub const SESSION_KEY: &str = "agenda-session";

pub fn workspaces_key(user_id: &str) -> String {
    format!("workspaces_{}", user_id)
}

pub fn current_workspace_key(user_id: &str) -> String {
    format!("current_workspace_{}", user_id)
}

pub fn members_key(user_id: &str) -> String {
    format!("members_{}", user_id)
}

#[derive(Clone)]
pub struct LocalStorage {
    db_connection: DBConnection,
}

impl LocalStorage {
    pub fn open(path: impl AsRef<Path>) -> InternalResult<LocalStorage> {
        LocalStorage::from_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> InternalResult<LocalStorage> {
        LocalStorage::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(connection: Connection) -> InternalResult<LocalStorage> {
        connection.execute(
            "CREATE TABLE IF NOT EXISTS local_storage (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            params![],
        )?;

        Ok(LocalStorage {
            db_connection: Arc::new(Mutex::new(connection)),
        })
    }

    pub fn get_item(&self, key: &str) -> InternalResult<Option<String>> {
        let db_connection = self.db_connection.lock()?;

        let value = db_connection
            .query_row(
                "SELECT value FROM local_storage WHERE key = (?1)",
                params![key],
                |row| row.get::<usize, String>(0),
            )
            .optional()?;

        Ok(value)
    }

    pub fn set_item(&self, key: &str, value: &str) -> InternalResult<()> {
        let db_connection = self.db_connection.lock()?;

        db_connection.execute(
            "INSERT INTO local_storage (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;

        Ok(())
    }

    pub fn remove_item(&self, key: &str) -> InternalResult<()> {
        let db_connection = self.db_connection.lock()?;
        db_connection.execute("DELETE FROM local_storage WHERE key = (?1)", params![key])?;

        Ok(())
    }

    pub fn keys(&self) -> InternalResult<Vec<String>> {
        let db_connection = self.db_connection.lock()?;
        let mut statement = db_connection.prepare("SELECT key FROM local_storage ORDER BY key")?;

        let keys = statement
            .query_map(params![], |row| row.get::<usize, String>(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(keys)
    }

    /// Reads and decodes a JSON value. A value that no longer parses is
    /// treated as absent so callers fall back to their defaults.
    pub fn read_json<T: DeserializeOwned>(&self, key: &str) -> InternalResult<Option<T>> {
        match self.get_item(key)? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    warn!(key, error = %e, "discarding unreadable local storage value");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> InternalResult<()> {
        let raw = serde_json::to_string(value)?;
        self.set_item(key, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let storage = LocalStorage::in_memory().unwrap();
        assert_eq!(storage.get_item("agenda-tasks").unwrap(), None);

        storage.set_item("agenda-tasks", "[]").unwrap();
        storage.set_item("agenda-tasks", "[1]").unwrap();
        assert_eq!(storage.get_item("agenda-tasks").unwrap().as_deref(), Some("[1]"));
        assert_eq!(storage.keys().unwrap(), vec!["agenda-tasks".to_string()]);

        storage.remove_item("agenda-tasks").unwrap();
        assert_eq!(storage.get_item("agenda-tasks").unwrap(), None);
    }

    #[test]
    fn unreadable_json_reads_as_absent() {
        let storage = LocalStorage::in_memory().unwrap();
        storage.set_item(SETTINGS_KEY, "{not json").unwrap();

        let value: Option<Vec<u32>> = storage.read_json(SETTINGS_KEY).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn values_survive_reopening_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agenda.db");

        LocalStorage::open(&path)
            .unwrap()
            .write_json(CATEGORIES_KEY, &vec!["a", "b"])
            .unwrap();

        let reopened = LocalStorage::open(&path).unwrap();
        let value: Option<Vec<String>> = reopened.read_json(CATEGORIES_KEY).unwrap();
        assert_eq!(value, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn per_user_keys() {
        assert_eq!(workspaces_key("u1"), "workspaces_u1");
        assert_eq!(current_workspace_key("u1"), "current_workspace_u1");
        assert_eq!(members_key("u1"), "members_u1");
    }
}
