//! In-process transport. The [`MemoryServer`] end plays the remote server:
//! every successful `connect` hands it a [`MemoryPeer`] that can push frames
//! to the client, read what the client sent, or drop the link.

use std::sync::{
    atomic::{AtomicU32, AtomicU64, Ordering},
    Arc,
};

use async_trait::async_trait;
use futures_util::sink;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    error::ChannelError,
    transport::{Connection, Connector},
    types::{CloseInfo, TransportFrame},
};

/// Client side of the in-memory transport. Cheap to clone.
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<ConnectorShared>,
}

struct ConnectorShared {
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
    refuse: AtomicU32,
    attempts: AtomicU64,
}

/// Server side: yields one peer per accepted connection.
pub struct MemoryServer {
    accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

/// The server's handle on one connection.
pub struct MemoryPeer {
    to_client: mpsc::UnboundedSender<Result<TransportFrame, ChannelError>>,
    from_client: mpsc::UnboundedReceiver<TransportFrame>,
}

impl MemoryConnector {
    pub fn pair() -> (Self, MemoryServer) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let connector = Self {
            shared: Arc::new(ConnectorShared {
                accept_tx,
                refuse: AtomicU32::new(0),
                attempts: AtomicU64::new(0),
            }),
        };
        (connector, MemoryServer { accept_rx })
    }

    /// Make the next `n` connection attempts fail.
    pub fn refuse_next(&self, n: u32) {
        self.shared.refuse.store(n, Ordering::SeqCst);
    }

    /// Number of `connect` calls so far, refused ones included.
    pub fn attempts(&self) -> u64 {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(&self, url: &str) -> Result<Connection, ChannelError> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .shared
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(ChannelError::ConnectionFailed(format!("{url}: connection refused")));
        }

        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();

        self.shared
            .accept_tx
            .send(MemoryPeer {
                to_client,
                from_client,
            })
            .map_err(|_| ChannelError::ConnectionFailed(format!("{url}: server is gone")))?;

        let sink = sink::unfold(client_tx, |tx, frame: TransportFrame| async move {
            tx.send(frame)
                .map_err(|_| ChannelError::SendFailed("peer disconnected".to_string()))?;
            Ok::<_, ChannelError>(tx)
        });

        Ok(Connection {
            sink: Box::pin(sink),
            stream: Box::pin(UnboundedReceiverStream::new(client_rx)),
        })
    }
}

impl MemoryServer {
    /// Wait for the next connection. `None` once every connector is dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.recv().await
    }

    /// Non-blocking variant of [`accept`](Self::accept).
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.try_recv().ok()
    }
}

impl MemoryPeer {
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_client
            .send(Ok(TransportFrame::Text(text.into())))
            .is_ok()
    }

    pub fn send_json(&self, value: &impl Serialize) -> bool {
        match serde_json::to_string(value) {
            Ok(text) => self.send_text(text),
            Err(_) => false,
        }
    }

    /// Deliver a transport error without ending the stream.
    pub fn send_error(&self, reason: impl Into<String>) -> bool {
        self.to_client
            .send(Err(ChannelError::ConnectionFailed(reason.into())))
            .is_ok()
    }

    /// Send a close frame and end the stream.
    pub fn close(self, info: Option<CloseInfo>) {
        let _ = self.to_client.send(Ok(TransportFrame::Close(info)));
    }

    /// Drop the link without a close frame, like a network loss.
    pub fn disconnect(self) {
        drop(self);
    }

    /// Next frame the client sent. `None` once the client dropped its sink.
    pub async fn recv(&mut self) -> Option<TransportFrame> {
        self.from_client.recv().await
    }

    pub fn try_recv(&mut self) -> Option<TransportFrame> {
        self.from_client.try_recv().ok()
    }
}
