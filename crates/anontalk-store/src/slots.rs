//! CRUD operations on the `session_slots` table.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Value stored under `name`, if any.
    pub fn get_slot(&self, name: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM session_slots WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Insert or replace the value under `name`.
    pub fn set_slot(&self, name: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO session_slots (name, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value,
                                             updated_at = excluded.updated_at",
            params![name, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Delete the slot. Returns `true` if a row was removed.
    pub fn clear_slot(&self, name: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM session_slots WHERE name = ?1", params![name])?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::database::Database;

    #[test]
    fn test_slot_crud() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get_slot("username").unwrap(), None);

        db.set_slot("username", "alice").unwrap();
        assert_eq!(db.get_slot("username").unwrap().as_deref(), Some("alice"));

        db.set_slot("username", "bob").unwrap();
        assert_eq!(db.get_slot("username").unwrap().as_deref(), Some("bob"));

        assert!(db.clear_slot("username").unwrap());
        assert!(!db.clear_slot("username").unwrap());
        assert_eq!(db.get_slot("username").unwrap(), None);
    }

    #[test]
    fn test_slots_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slots.db");

        {
            let db = Database::open_at(&path).unwrap();
            db.set_slot("pair", "opaque-blob").unwrap();
        }

        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.get_slot("pair").unwrap().as_deref(), Some("opaque-blob"));
    }
}
