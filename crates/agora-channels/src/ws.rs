use agora_core::RealtimeConfig;
use async_trait::async_trait;
use futures_util::{future, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{
    self,
    client::IntoClientRequest,
    handshake::client::Request,
    http::header::{HeaderValue, COOKIE},
    protocol::{frame::coding::CloseCode, CloseFrame},
    Message,
};
use tracing::debug;

use crate::{
    error::ChannelError,
    transport::{Connection, Connector},
    types::{CloseInfo, TransportFrame},
};

/// WebSocket transport over `tokio-tungstenite` (ws:// and wss://).
///
/// The server authenticates the upgrade through the session cookie, so the
/// configured cookie is attached to every handshake.
pub struct WsConnector {
    cookie: Option<String>,
}

impl WsConnector {
    pub fn new(cookie: Option<String>) -> Self {
        Self { cookie }
    }

    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self::new(config.cookie.clone())
    }

    /// Upgrade request for `url`, with the session cookie attached.
    fn handshake_request(&self, url: &str) -> Result<Request, ChannelError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| ChannelError::ConfigError(format!("invalid endpoint {url}: {e}")))?;

        if let Some(cookie) = &self.cookie {
            let value = HeaderValue::from_str(cookie)
                .map_err(|_| ChannelError::ConfigError("cookie is not a valid header value".into()))?;
            request.headers_mut().insert(COOKIE, value);
        }
        Ok(request)
    }
}

#[async_trait]
impl Connector for WsConnector {
    fn name(&self) -> &str {
        "websocket"
    }

    async fn connect(&self, url: &str) -> Result<Connection, ChannelError> {
        let request = self.handshake_request(url)?;

        let (ws, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;
        debug!(status = %response.status(), "websocket handshake complete");

        let (write, read) = ws.split();
        let sink = write
            .sink_map_err(|e| ChannelError::SendFailed(e.to_string()))
            .with(|frame: TransportFrame| future::ready(Ok::<_, ChannelError>(to_message(frame))));
        let stream = read.filter_map(|msg| future::ready(from_message(msg)));

        Ok(Connection {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

fn to_message(frame: TransportFrame) -> Message {
    match frame {
        TransportFrame::Text(text) => Message::text(text),
        TransportFrame::Close(info) => Message::Close(info.map(|info| CloseFrame {
            code: CloseCode::from(info.code),
            reason: info.reason.into(),
        })),
    }
}

fn from_message(
    msg: Result<Message, tungstenite::Error>,
) -> Option<Result<TransportFrame, ChannelError>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(TransportFrame::Text(text.as_str().to_owned()))),
        Ok(Message::Close(frame)) => Some(Ok(TransportFrame::Close(frame.map(|f| {
            CloseInfo::new(u16::from(f.code), f.reason.as_str())
        })))),
        // tungstenite answers pings itself; binary frames are not part of the protocol
        Ok(_) => None,
        Err(e) => Some(Err(ChannelError::ConnectionFailed(e.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_frames_keep_code_and_reason() {
        let msg = to_message(TransportFrame::Close(Some(CloseInfo::normal())));
        let back = from_message(Ok(msg)).unwrap().unwrap();
        assert_eq!(back, TransportFrame::Close(Some(CloseInfo::normal())));
    }

    #[test]
    fn control_frames_are_filtered() {
        assert!(from_message(Ok(Message::Ping(Vec::new().into()))).is_none());
        assert!(from_message(Ok(Message::Binary(vec![1, 2, 3].into()))).is_none());
    }

    #[test]
    fn text_frames_pass_through() {
        let back = from_message(Ok(Message::text(r#"{"type":"pong"}"#))).unwrap().unwrap();
        assert_eq!(back, TransportFrame::Text(r#"{"type":"pong"}"#.to_string()));
    }

    #[test]
    fn cookie_is_sent_on_upgrade() {
        let connector = WsConnector::new(Some("session_id=abc123".into()));
        let request = connector.handshake_request("ws://localhost:8080/ws").unwrap();
        assert_eq!(
            request.headers().get(COOKIE).unwrap().to_str().unwrap(),
            "session_id=abc123"
        );
    }

    #[test]
    fn no_cookie_header_without_cookie() {
        let request = WsConnector::new(None)
            .handshake_request("ws://localhost:8080/ws")
            .unwrap();
        assert!(request.headers().get(COOKIE).is_none());
    }

    #[test]
    fn invalid_cookie_is_a_config_error() {
        let connector = WsConnector::new(Some("session_id=abc\n123".into()));
        let err = connector.handshake_request("ws://localhost:8080/ws").unwrap_err();
        assert!(matches!(err, ChannelError::ConfigError(_)));
    }

    #[test]
    fn invalid_endpoint_is_a_config_error() {
        let err = WsConnector::new(None).handshake_request("not a url").unwrap_err();
        assert!(matches!(err, ChannelError::ConfigError(_)));
    }
}
