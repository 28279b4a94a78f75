use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::error::CoreError;
use crate::pb;

/// Payload of a `NOTIFICATION` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyEvent {
    pub text: String,
}

/// Symbolic action carried on an `ActionEvent`, serialized as its integer
/// tag so it round-trips identically to the wire `Action` enum's numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum ActionKind {
    Empty = 0,
    SwitchOn = 1,
    SwitchOff = 2,
    Toggle = 3,
}

impl ActionKind {
    /// Parses the lowercased symbolic action name used in Gateway device
    /// config (`switchon`, `switchoff`, `toggle`).
    #[must_use]
    pub fn from_symbolic(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "switchon" => Some(Self::SwitchOn),
            "switchoff" => Some(Self::SwitchOff),
            "toggle" => Some(Self::Toggle),
            _ => None,
        }
    }
}

/// Payload of a `SWITCH`/`TOGGLE` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEvent {
    pub device_id: String,
    pub action: ActionKind,
}

/// JSON-encodes a payload for inclusion in the protobuf `Event.payload`
/// field. Codec errors are handled by each caller per the propagation
/// policy for `Codec` (hub maps to `Internal`, gateway logs and drops).
pub fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    serde_json::to_vec(value).map_err(CoreError::Codec)
}

pub fn decode_payload<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, CoreError> {
    serde_json::from_slice(bytes).map_err(CoreError::Codec)
}

/// Builds a wire `Event` with a fresh id.
#[must_use]
pub fn new_event(action: pb::Action, payload: Vec<u8>) -> pb::Event {
    pb::Event {
        id: autorc_common::new_event_id(),
        action: action as i32,
        payload,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn notify_event_round_trips() {
        let original = NotifyEvent {
            text: "door open".to_string(),
        };
        let encoded = encode_payload(&original).unwrap();
        let decoded: NotifyEvent = decode_payload(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn action_event_round_trips() {
        let original = ActionEvent {
            device_id: "Lamp001".to_string(),
            action: ActionKind::SwitchOn,
        };
        let encoded = encode_payload(&original).unwrap();
        let decoded: ActionEvent = decode_payload(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn action_kind_serializes_as_integer_tag() {
        let json = serde_json::to_string(&ActionKind::SwitchOn).unwrap();
        assert_eq!(json, "1");
    }

    #[test]
    fn from_symbolic_is_case_insensitive() {
        assert_eq!(ActionKind::from_symbolic("SwitchON"), Some(ActionKind::SwitchOn));
        assert_eq!(ActionKind::from_symbolic("bogus"), None);
    }
}
