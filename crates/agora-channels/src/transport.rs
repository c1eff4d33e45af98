use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Sink, Stream};

use crate::{error::ChannelError, types::TransportFrame};

/// Write half of a connection.
pub type FrameSink = Pin<Box<dyn Sink<TransportFrame, Error = ChannelError> + Send>>;

/// Read half of a connection. The stream ending (or yielding an error and
/// then ending) means the connection is gone.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<TransportFrame, ChannelError>> + Send>>;

/// One established physical connection. Never reused: every reconnect asks
/// the [`Connector`] for a fresh one.
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens connections to a server-push endpoint.
///
/// Implementations must be `Send + Sync` so a manager can hold one behind an
/// `Arc` and call it from its connection tasks.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Stable lowercase identifier used in logs (e.g. `"websocket"`).
    fn name(&self) -> &str;

    /// Perform the handshake with `url` and return both halves.
    async fn connect(&self, url: &str) -> Result<Connection, ChannelError>;
}
