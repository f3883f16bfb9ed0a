//! The two client-side session slots behind one small trait.
//!
//! `username` holds the last signed-in name in plaintext; `pair` holds the
//! opaque session credential. Absence of either means there is no session to
//! restore.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::database::Database;
use crate::error::Result;

pub const SLOT_USERNAME: &str = "username";
pub const SLOT_CREDENTIAL: &str = "pair";

/// Named string slots that outlive the process.
pub trait SessionStore: Send + Sync + 'static {
    fn get(&self, slot: &str) -> Result<Option<String>>;
    fn set(&self, slot: &str, value: &str) -> Result<()>;
    fn remove(&self, slot: &str) -> Result<()>;

    /// Both slots, or `None` if either is missing.
    fn load_session(&self) -> Result<Option<SavedSession>> {
        let username = self.get(SLOT_USERNAME)?;
        let credential = self.get(SLOT_CREDENTIAL)?;
        Ok(username
            .zip(credential)
            .map(|(username, credential)| SavedSession {
                username,
                credential,
            }))
    }

    fn save_session(&self, username: &str, credential: &str) -> Result<()> {
        self.set(SLOT_USERNAME, username)?;
        self.set(SLOT_CREDENTIAL, credential)
    }

    /// Remove both slots. Attempts both even if the first fails.
    fn clear_session(&self) -> Result<()> {
        let username = self.remove(SLOT_USERNAME);
        let credential = self.remove(SLOT_CREDENTIAL);
        username.and(credential)
    }
}

/// Contents of the two slots.
#[derive(Clone, PartialEq, Eq)]
pub struct SavedSession {
    pub username: String,
    pub credential: String,
}

impl std::fmt::Debug for SavedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SavedSession")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// SQLite-backed slots.
pub struct SqliteSessionStore {
    db: Mutex<Database>,
}

impl SqliteSessionStore {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for SqliteSessionStore {
    fn get(&self, slot: &str) -> Result<Option<String>> {
        self.db().get_slot(slot)
    }

    fn set(&self, slot: &str, value: &str) -> Result<()> {
        self.db().set_slot(slot, value)
    }

    fn remove(&self, slot: &str) -> Result<()> {
        self.db().clear_slot(slot).map(|_| ())
    }
}

/// Process-local slots for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemorySessionStore {
    slots: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, slot: &str) -> Result<Option<String>> {
        Ok(self.slots().get(slot).cloned())
    }

    fn set(&self, slot: &str, value: &str) -> Result<()> {
        self.slots().insert(slot.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, slot: &str) -> Result<()> {
        self.slots().remove(slot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn SessionStore) {
        assert_eq!(store.load_session().unwrap(), None);

        store.set(SLOT_USERNAME, "alice").unwrap();
        // One slot alone is not a session.
        assert_eq!(store.load_session().unwrap(), None);

        store.save_session("alice", "blob").unwrap();
        assert_eq!(
            store.load_session().unwrap(),
            Some(SavedSession {
                username: "alice".into(),
                credential: "blob".into(),
            })
        );

        store.clear_session().unwrap();
        assert_eq!(store.get(SLOT_USERNAME).unwrap(), None);
        assert_eq!(store.get(SLOT_CREDENTIAL).unwrap(), None);
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemorySessionStore::new());
    }

    #[test]
    fn test_sqlite_store() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("session.db")).unwrap();
        exercise(&SqliteSessionStore::new(db));
    }

    #[test]
    fn test_debug_hides_credential() {
        let saved = SavedSession {
            username: "alice".into(),
            credential: "secret-blob".into(),
        };
        assert!(!format!("{saved:?}").contains("secret-blob"));
    }
}
