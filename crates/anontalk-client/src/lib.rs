//! # anontalk-client
//!
//! Chat core for AnonTalk: account sign-up and sign-in, presence, the
//! channel registry, per-channel message streams, profile pictures and
//! media uploads, all on top of a [`GraphClient`](anontalk_graph::GraphClient).

pub mod channels;
pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod media;
pub mod messages;
pub mod presence;
pub mod profile;
pub mod session;

use tracing_subscriber::{fmt, EnvFilter};

pub use channels::{ChannelRegistry, ChannelSet};
pub use config::ClientConfig;
pub use error::{AuthError, ClientError, MediaError, Result, UploadError, WriteError};
pub use events::ConnectionState;
pub use identity::IdentityManager;
pub use media::{prepare_image, MediaPipeline, MediaUploader, PinataUploader};
pub use messages::{ChannelTimeline, ChannelView, MessageStream};
pub use presence::{OnlineUser, PresenceState, PresenceTracker, PresenceView};
pub use profile::{ProfileService, ProfileWatch};
pub use session::{open_session_store, ChatClient, Session};

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the
/// default filter. Calling it twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("anontalk_client=debug,anontalk_graph=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
