//! Isolation-boundary message protocol
//!
//! Structured messages exchanged with the hosted prototype document. The
//! field names are fixed by the in-document agent script and must not
//! change.
//!
//! ```text
//! controller ──GET_COORDS {targetSelector, actionId}──▶ document
//! controller ◀──COORDS_RESPONSE {actionId, coords}───── document
//! controller ──CLICK {targetSelector}─────────────────▶ document
//! controller ──TYPE {targetSelector, text}────────────▶ document
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::Coords;

/// Correlation identifier minted per coordinate lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    /// Fresh, unguessable identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Controller → document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundMessage {
    GetCoords {
        #[serde(rename = "targetSelector")]
        target_selector: String,
        #[serde(rename = "actionId")]
        action_id: ActionId,
    },
    Click {
        #[serde(rename = "targetSelector")]
        target_selector: String,
    },
    Type {
        #[serde(rename = "targetSelector")]
        target_selector: String,
        text: String,
    },
}

impl OutboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::GetCoords { .. } => "GET_COORDS",
            OutboundMessage::Click { .. } => "CLICK",
            OutboundMessage::Type { .. } => "TYPE",
        }
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Document → controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundMessage {
    CoordsResponse {
        #[serde(rename = "actionId")]
        action_id: ActionId,
        coords: Coords,
    },
}

impl InboundMessage {
    /// Decode a raw message posted by the hosted document.
    ///
    /// The document is untrusted: anything that is not a well-formed
    /// `COORDS_RESPONSE` is an error the caller is expected to drop.
    pub fn decode(raw: &serde_json::Value) -> Result<Self> {
        match raw.get("type").and_then(|t| t.as_str()) {
            Some("COORDS_RESPONSE") => {}
            Some(other) => {
                trace!("Ignoring boundary message of type {}", other);
                return Err(Error::InvalidMessage(format!("unexpected type {}", other)));
            }
            None => return Err(Error::InvalidMessage("missing type".to_string())),
        }
        Ok(serde_json::from_value(raw.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outbound_field_names() {
        let msg = OutboundMessage::GetCoords {
            target_selector: "#submit".to_string(),
            action_id: ActionId::from("abc123"),
        };
        assert_eq!(
            msg.to_value().unwrap(),
            json!({"type": "GET_COORDS", "targetSelector": "#submit", "actionId": "abc123"})
        );

        let msg = OutboundMessage::Type {
            target_selector: "#email".to_string(),
            text: "hi".to_string(),
        };
        assert_eq!(
            msg.to_value().unwrap(),
            json!({"type": "TYPE", "targetSelector": "#email", "text": "hi"})
        );
    }

    #[test]
    fn test_decode_coords_response() {
        let raw = json!({"type": "COORDS_RESPONSE", "actionId": "k1", "coords": {"x": 10.5, "y": 20}});
        let InboundMessage::CoordsResponse { action_id, coords } = InboundMessage::decode(&raw).unwrap();
        assert_eq!(action_id.as_str(), "k1");
        assert_eq!(coords, Coords::new(10.5, 20.0));
    }

    #[test]
    fn test_decode_rejects_foreign_messages() {
        assert!(InboundMessage::decode(&json!({"type": "CLICK", "targetSelector": "a"})).is_err());
        assert!(InboundMessage::decode(&json!({"actionId": "k1"})).is_err());
        assert!(InboundMessage::decode(&json!("hello")).is_err());
        assert!(InboundMessage::decode(&json!({"type": "COORDS_RESPONSE", "actionId": "k1"})).is_err());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = ActionId::generate();
        let b = ActionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }
}
