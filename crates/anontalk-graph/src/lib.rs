// Replicated graph store access: the client surface, an in-process store and
// a WebSocket client for the relay.

pub mod client;
pub mod error;
pub mod memory;
pub mod peers;
pub mod remote;
pub mod state;
pub mod wire;

pub use client::{GraphClient, GraphEvent, PeerEvent, Scope, Subscription};
pub use error::{GraphError, Result};
pub use memory::MemoryGraph;
pub use peers::{PeerSession, PeerTracker};
pub use remote::RemoteGraph;
pub use state::{Stamped, StampedFields, StateClock};
