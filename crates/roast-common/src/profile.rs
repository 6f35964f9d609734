//! Roast profile data: recorded or loaded temperature/event/control curves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single temperature sample in a roast profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperaturePoint {
    /// Milliseconds since roast start.
    pub timestamp_ms: f64,
    /// Environment temperature in Celsius.
    pub et: f64,
    /// Bean temperature in Celsius.
    pub bt: f64,
}

/// A roast event such as `CHARGE`, `DRY`, `FCs`, `FCe`, `SCs`, `DROP`, `COOL`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoastEvent {
    /// Event identifier string.
    pub event_type: String,
    /// When the event occurred, in milliseconds since roast start.
    pub timestamp_ms: f64,
    /// Whether the event was detected automatically rather than logged by hand.
    #[serde(default)]
    pub auto_detected: bool,
}

/// An operator control change recorded at a point in time: `(timestamp_ms, value)`.
pub type ControlSample = (f64, f64);

/// A complete roast profile, either freshly recorded or loaded for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoastProfile {
    /// Unique profile ID, assigned on persistence.
    #[serde(default)]
    pub id: Option<String>,
    /// Profile display name.
    pub name: String,
    /// Machine name this profile was recorded on.
    #[serde(default)]
    pub machine: String,
    /// Creation timestamp.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Bean name/origin.
    #[serde(default)]
    pub bean_name: String,
    /// Bean charge weight in grams.
    #[serde(default)]
    pub bean_weight_g: f64,
    /// Bean moisture percentage, 0-100.
    #[serde(default)]
    pub bean_moisture_pct: f64,

    /// ET/BT time series.
    #[serde(default)]
    pub temperatures: Vec<TemperaturePoint>,
    /// Auxiliary channel time series, keyed by channel name.
    #[serde(default)]
    pub extra_channels: std::collections::HashMap<String, Vec<f64>>,

    /// Recorded roast events.
    #[serde(default)]
    pub events: Vec<RoastEvent>,

    /// Control slider curves for replay, keyed by channel name.
    #[serde(default)]
    pub controls: std::collections::HashMap<String, Vec<ControlSample>>,
}

/// Connection parameters for a machine, as recorded alongside a profile or
/// used to describe an ad hoc connection target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Display name for this machine.
    pub name: String,
    /// Driver identifier, e.g. `"modbus_rtu"`.
    pub driver: String,
    /// Hostname or address.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Sampling interval in milliseconds, 500-10000.
    #[serde(default = "default_sampling_interval_ms")]
    pub sampling_interval_ms: u32,
    /// Driver-specific extra parameters.
    #[serde(default)]
    pub extra_params: std::collections::HashMap<String, String>,
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    502
}
fn default_sampling_interval_ms() -> u32 {
    3000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_point_round_trips_json() {
        let point = TemperaturePoint {
            timestamp_ms: 1500.0,
            et: 205.3,
            bt: 150.1,
        };
        let json = serde_json::to_string(&point).unwrap();
        let parsed: TemperaturePoint = serde_json::from_str(&json).unwrap();
        assert_eq!(point, parsed);
    }

    #[test]
    fn roast_event_defaults_auto_detected_false() {
        let json = r#"{"event_type": "CHARGE", "timestamp_ms": 0}"#;
        let event: RoastEvent = serde_json::from_str(json).unwrap();
        assert!(!event.auto_detected);
    }
}
