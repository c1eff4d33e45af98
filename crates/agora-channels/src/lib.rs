//! Realtime channel manager: one logical server-push connection per session,
//! type-keyed dispatch of inbound envelopes and automatic reconnection.

pub mod backoff;
pub mod error;
pub mod manager;
#[cfg(feature = "test-support")]
pub mod memory;
pub mod registry;
pub mod transport;
pub mod types;
pub mod ws;

pub use error::ChannelError;
pub use manager::ChannelManager;
#[cfg(feature = "test-support")]
pub use memory::{MemoryConnector, MemoryPeer, MemoryServer};
pub use registry::Subscription;
pub use transport::{Connection, Connector};
pub use types::{CloseInfo, ConnectionState, TransportFrame};
pub use ws::WsConnector;
