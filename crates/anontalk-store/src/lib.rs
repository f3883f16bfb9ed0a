//! # anontalk-store
//!
//! Local persistence for the AnonTalk client: the two session slots that
//! let a restart re-authenticate without a password. Backed by SQLite with
//! `user_version` migrations; an in-memory implementation serves tests.

pub mod database;
pub mod migrations;
pub mod session;
pub mod slots;

mod error;

pub use database::{default_data_dir, Database};
pub use error::{Result, StoreError};
pub use session::{
    MemorySessionStore, SavedSession, SessionStore, SqliteSessionStore, SLOT_CREDENTIAL,
    SLOT_USERNAME,
};
