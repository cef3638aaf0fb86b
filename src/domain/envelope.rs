//! Push message envelope.
//!
//! Frames are JSON objects carrying a string `type` discriminant. The
//! payload is the `data` member when present, otherwise the whole frame.

use serde_json::Value;

use super::error::SyncError;

/// Discriminant field carried by every frame.
pub const TYPE_FIELD: &str = "type";

/// Payload field, when the frame wraps its body.
pub const DATA_FIELD: &str = "data";

/// A parsed push frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Value of the `type` discriminant.
    pub kind: String,
    /// Message body.
    pub payload: Value,
}

impl Envelope {
    /// Split a frame into discriminant and payload.
    ///
    /// Frames without a string `type` are protocol errors.
    pub fn from_value(frame: Value) -> Result<Self, SyncError> {
        let Value::Object(mut map) = frame else {
            return Err(SyncError::Protocol("frame is not an object".to_string()));
        };

        let kind = match map.get(TYPE_FIELD) {
            Some(Value::String(kind)) => kind.clone(),
            _ => {
                return Err(SyncError::Protocol(
                    "frame has no string `type` field".to_string(),
                ));
            }
        };

        let payload = match map.remove(DATA_FIELD) {
            Some(data) => data,
            None => Value::Object(map),
        };

        Ok(Self { kind, payload })
    }

    /// Whether the frame carries the expected discriminant.
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }
}
