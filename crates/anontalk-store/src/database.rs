//! The on-disk SQLite file holding session slots. Every constructor runs
//! the migrations before handing the connection out.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

const DB_FILE_NAME: &str = "anontalk.db";

pub struct Database {
    conn: Connection,
}

impl Database {
    /// `anontalk.db` under the per-user data directory, e.g.
    /// `~/.local/share/anontalk` on Linux.
    pub fn new() -> Result<Self> {
        Self::open_in_dir(&default_data_dir()?)
    }

    /// Open (or create) `anontalk.db` inside `dir`, creating the directory.
    pub fn open_in_dir(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(DB_FILE_NAME);
        tracing::info!(path = %path.display(), "Opening session database");
        Self::open_at(&path)
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// A throwaway database that lives only as long as the handle.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// `None` for in-memory databases.
    pub fn path(&self) -> Option<PathBuf> {
        self.conn
            .path()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }
}

pub fn default_data_dir() -> Result<PathBuf> {
    ProjectDirs::from("org", "anontalk", "anontalk")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(StoreError::NoDataDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_backed_has_path_memory_does_not() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("session.db")).unwrap();
        assert!(db.path().is_some());

        assert!(Database::open_in_memory().unwrap().path().is_none());
    }

    #[test]
    fn test_open_in_dir_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");

        let db = Database::open_in_dir(&nested).unwrap();
        assert!(nested.join(DB_FILE_NAME).exists());
        drop(db);
    }
}
