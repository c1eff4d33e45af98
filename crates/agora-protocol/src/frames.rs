use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Reasons a frame cannot become (or be built into) an [`Envelope`].
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame has no string `type` discriminator")]
    MissingType,

    #[error("payload for `{event_type}` must serialize to a JSON object")]
    PayloadNotObject { event_type: String },
}

/// Tagged realtime message, in both directions.
/// Wire: `{ "type": "chat", "sender_id": 1, "recipient_id": 2, "content": "hi" }`
///
/// Everything except the discriminator is the body; handlers receive the body
/// as a JSON object via [`Envelope::payload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Envelope {
    /// Build an envelope from any payload that serializes to an object (or `null`).
    pub fn new(event_type: impl Into<String>, payload: impl Serialize) -> Result<Self, FrameError> {
        let event_type = event_type.into();
        let mut body = match serde_json::to_value(payload)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => return Err(FrameError::PayloadNotObject { event_type }),
        };
        // the discriminator is owned by `event_type`; never let the body shadow it
        body.remove("type");
        Ok(Self { event_type, body })
    }

    /// Envelope with an empty body, e.g. `{"type":"ping"}`.
    pub fn bare(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            body: Map::new(),
        }
    }

    pub fn payload(&self) -> Value {
        Value::Object(self.body.clone())
    }

    /// Decode the body into a typed event.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, FrameError> {
        Ok(serde_json::from_value(self.payload())?)
    }

    pub fn to_json(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Parse one inbound text frame.
///
/// Objects without a `type` are assigned `untagged_type` when one is given;
/// the likes endpoint pushes its updates that way.
pub fn parse_frame(text: &str, untagged_type: Option<&str>) -> Result<Envelope, FrameError> {
    let Value::Object(mut body) = serde_json::from_str::<Value>(text)? else {
        return Err(FrameError::NotAnObject);
    };

    let event_type = match body.remove("type") {
        Some(Value::String(t)) => t,
        Some(_) => return Err(FrameError::MissingType),
        None => match untagged_type {
            Some(t) => t.to_string(),
            None => return Err(FrameError::MissingType),
        },
    };

    Ok(Envelope { event_type, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_keeps_fields_besides_type() {
        let env = parse_frame(r#"{"type":"chat","sender_id":1,"content":"hi"}"#, None).unwrap();
        assert_eq!(env.event_type, "chat");
        assert_eq!(env.payload(), json!({"sender_id": 1, "content": "hi"}));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(parse_frame("not json", None), Err(FrameError::Json(_))));
        assert!(matches!(parse_frame("[1,2]", None), Err(FrameError::NotAnObject)));
        assert!(matches!(parse_frame(r#"{"type":7}"#, None), Err(FrameError::MissingType)));
        assert!(matches!(parse_frame(r#"{"a":1}"#, None), Err(FrameError::MissingType)));
    }

    #[test]
    fn untagged_frames_take_configured_type() {
        let env = parse_frame(r#"{"post_id":3,"like_count":9}"#, Some("like")).unwrap();
        assert_eq!(env.event_type, "like");
        // a tagged frame keeps its own type even when a fallback is configured
        let env = parse_frame(r#"{"type":"pong"}"#, Some("like")).unwrap();
        assert_eq!(env.event_type, "pong");
    }

    #[test]
    fn new_rejects_scalar_payloads() {
        let err = Envelope::new("chat", "just a string").unwrap_err();
        assert!(matches!(err, FrameError::PayloadNotObject { .. }));
    }

    #[test]
    fn new_strips_type_from_body() {
        let env = Envelope::new("typing", json!({"type": "spoof", "typing": true})).unwrap();
        assert_eq!(env.event_type, "typing");
        assert!(!env.body.contains_key("type"));
        let wire = env.to_json().unwrap();
        assert_eq!(wire.matches(r#""type""#).count(), 1);
    }
}
