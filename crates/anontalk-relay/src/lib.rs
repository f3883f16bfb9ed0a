//! # anontalk-relay
//!
//! Relay peer for the AnonTalk graph:
//! - **WebSocket endpoint** (`/gun`) speaking the graph frame protocol
//! - **Seeding** of the namespace roots and the default channel at startup
//! - **Presence sweep** marking silent users offline

pub mod api;
pub mod config;
pub mod error;
pub mod relay;
pub mod seed;
pub mod sweep;

pub use api::{build_router, serve, serve_on, AppState};
pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use seed::seed;
pub use sweep::{spawn_sweeper, sweep_once};
