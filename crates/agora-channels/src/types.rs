use agora_core::config::NORMAL_CLOSURE_CODE;
use serde::{Deserialize, Serialize};

/// Lifecycle of the manager's single logical connection.
///
/// `Idle → Connecting → Open → (Closing) → Closed`, and back to `Connecting`
/// whenever a reconnect fires or `connect()` is called again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Constructed, never connected.
    Idle,
    /// A transport handshake is in flight.
    Connecting,
    /// Frames flow in both directions.
    Open,
    /// A normal closure was requested and is being flushed.
    Closing,
    /// No connection. A reconnect timer may be pending.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Close code and reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    /// The closure sent for intentional, client-initiated teardown.
    pub fn normal() -> Self {
        Self {
            code: NORMAL_CLOSURE_CODE,
            reason: "client closed".to_string(),
        }
    }

    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn is_normal(&self) -> bool {
        self.code == NORMAL_CLOSURE_CODE
    }
}

/// The frames a transport exchanges with the manager. Transport-level
/// control traffic (ping/pong, binary) never reaches this layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFrame {
    Text(String),
    Close(Option<CloseInfo>),
}
