use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("session database: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The platform offers no per-user data directory to hold the database.
    #[error("no per-user data directory available")]
    NoDataDir,

    #[error("creating session directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("schema migration failed: {0}")]
    Migration(String),

    /// The file was written by a build with a newer schema.
    #[error("session database schema v{found} is newer than supported v{supported}")]
    SchemaTooNew { found: u32, supported: u32 },
}

pub type Result<T> = std::result::Result<T, StoreError>;
