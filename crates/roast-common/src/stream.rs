//! Wire message contract for the live streaming endpoint.
//!
//! Lives in `roast-common` rather than the streaming crate itself so both
//! `roast-manager` (which produces [`ServerMessage`]s from the sampling
//! loop and session transitions) and `roast-stream` (which only moves them
//! over a WebSocket) can depend on one shared definition without a cycle
//! between the two.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A message the gateway sends to an attached observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A temperature sample.
    Temperature {
        /// Milliseconds since the session started.
        timestamp_ms: f64,
        /// Environment temperature, Celsius.
        et: f64,
        /// Bean temperature, Celsius.
        bt: f64,
        /// ET rate of rise, °C/min.
        et_ror: f64,
        /// BT rate of rise, °C/min.
        bt_ror: f64,
        /// Auxiliary channel readings by name.
        #[serde(rename = "extra_channels")]
        extra: HashMap<String, f64>,
    },
    /// A recorded roast event (CHARGE, DROP, etc).
    Event {
        /// Event name.
        event_type: String,
        /// Milliseconds since the session started.
        timestamp_ms: f64,
        /// Whether the event was detected automatically rather than marked
        /// by the operator.
        auto_detected: bool,
        /// Bean temperature at the moment of the event.
        bt_at_event: f64,
        /// Environment temperature at the moment of the event.
        et_at_event: f64,
    },
    /// A session state transition.
    State {
        /// The session's new state.
        state: String,
        /// The session's state immediately before this transition.
        previous_state: String,
    },
    /// A driver connection status change.
    Connection {
        /// The driver's current connection state.
        driver_state: String,
        /// The driver's human-readable name.
        driver_name: String,
        /// Human-readable detail, e.g. the reason for an `error` state.
        message: String,
    },
    /// Acknowledgement of an inbound control write.
    ControlAck {
        /// Control channel written.
        channel: String,
        /// Normalized value the operator sent, `[0, 1]`.
        value: f64,
        /// Whether the write was applied to the driver.
        applied: bool,
        /// Whether the control was enabled.
        enabled: bool,
        /// Human-readable detail, present on failure.
        message: Option<String>,
    },
    /// An error reply to an inbound message.
    Error {
        /// Machine-readable error code.
        code: String,
        /// Human-readable detail.
        message: String,
        /// Whether the connection remains usable.
        recoverable: bool,
    },
    /// Reserved: an alarm condition. No code in this system produces one
    /// yet; the shape exists so the wire contract is forward-compatible.
    Alarm {
        /// Alarm severity.
        severity: String,
        /// Human-readable detail.
        message: String,
        /// Milliseconds since the session started.
        timestamp_ms: f64,
    },
    /// Reserved: a replay control message. No code in this system produces
    /// one yet.
    Replay {
        /// Replay action requested.
        action: String,
        /// Opaque payload.
        payload: serde_json::Value,
    },
}

/// A message an observer sends to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Write a normalized value to a control channel.
    Control {
        /// Control channel to write.
        channel: String,
        /// Normalized value, expected in `[0, 1]`.
        value: f64,
        /// Whether the control is enabled; disabled writes apply `0`.
        enabled: bool,
    },
    /// A session lifecycle or sync command.
    Command {
        /// `start_monitoring` | `stop_monitoring` | `start_recording` |
        /// `stop_recording` | `mark_event` | `reset` | `sync`.
        action: String,
        /// Event name, required for `mark_event`.
        #[serde(default)]
        event_type: Option<String>,
        /// Exclusive lower timestamp bound, required for `sync`.
        #[serde(default)]
        since_ms: Option<f64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_message_serializes_with_type_tag() {
        let msg = ServerMessage::Temperature {
            timestamp_ms: 1000.0,
            et: 200.0,
            bt: 180.0,
            et_ror: 30.0,
            bt_ror: 20.0,
            extra: HashMap::new(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "temperature");
        assert_eq!(json["et"], 200.0);
        assert!(json.get("extra_channels").is_some());
        assert!(json.get("extra").is_none());
    }

    #[test]
    fn control_command_round_trips_json() {
        let json = r#"{"type":"control","channel":"burner","value":0.5,"enabled":true}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Control {
                channel: "burner".to_string(),
                value: 0.5,
                enabled: true,
            }
        );
    }

    #[test]
    fn sync_command_omits_optional_fields() {
        let json = r#"{"type":"command","action":"sync","since_ms":1200.0}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Command {
                action: "sync".to_string(),
                event_type: None,
                since_ms: Some(1200.0),
            }
        );
    }
}
