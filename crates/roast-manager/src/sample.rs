//! The per-tick reading a machine's sampling loop produces.

use std::collections::HashMap;

/// One temperature reading plus derived rate-of-rise and auxiliary channel
/// values, as broadcast to observers and retained in the ring buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Milliseconds since the machine was connected.
    pub timestamp_ms: f64,
    /// Environment temperature, Celsius.
    pub et: f64,
    /// Bean temperature, Celsius.
    pub bt: f64,
    /// ET rate of rise, °C/min. Zero when there's no previous reading.
    pub et_ror: f64,
    /// BT rate of rise, °C/min. Zero when there's no previous reading.
    pub bt_ror: f64,
    /// Auxiliary channel readings by name.
    pub extra: HashMap<String, f64>,
}

/// Rate of rise in °C/min between two readings `dt_ms` apart. Zero if
/// `dt_ms` isn't positive, matching "RoR is zero when the previous reading
/// is undefined".
#[must_use]
pub fn rate_of_rise(previous: f64, current: f64, dt_ms: f64) -> f64 {
    if dt_ms <= 0.0 {
        return 0.0;
    }
    let dt_min = dt_ms / 1000.0 / 60.0;
    (current - previous) / dt_min
}
