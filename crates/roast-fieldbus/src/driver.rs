//! Driver abstraction: all machine drivers implement [`RoasterDriver`] so the
//! rest of the system can work with any roaster without knowing the
//! communication details.

use async_trait::async_trait;
use roast_common::RoastResult;
use std::collections::HashMap;

/// Driver connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected.
    #[default]
    Disconnected,
    /// Connection attempt in progress.
    Connecting,
    /// Connected and ready for I/O.
    Connected,
    /// A prior operation failed; the link is not usable until reconnected.
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A single temperature reading from the roaster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureReading {
    /// Environment/exhaust temperature, in Celsius.
    pub et: f64,
    /// Bean temperature, in Celsius.
    pub bt: f64,
    /// Milliseconds since roast start (0 during monitoring-only reads).
    pub timestamp_ms: f64,
}

/// Metadata describing a driver implementation.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverInfo {
    /// Human-readable driver name, e.g. `"Modbus TCP"`.
    pub name: String,
    /// Roaster manufacturer, e.g. `"Carmomaq"`.
    pub manufacturer: String,
    /// Roaster model, e.g. `"Stratto 2.0"`.
    pub model: String,
    /// Communication protocol identifier.
    pub protocol: String,
}

/// Abstraction over a roaster communication driver.
///
/// Implementors only need `connect`/`disconnect`/`read_temperatures`/`info`/
/// `state`; `write_control` and `read_extra_channels` have defaults for
/// drivers that don't support them.
#[async_trait]
pub trait RoasterDriver: Send + Sync {
    /// Establish a connection to the roaster hardware.
    async fn connect(&mut self) -> RoastResult<()>;

    /// Close the connection to the roaster hardware.
    async fn disconnect(&mut self) -> RoastResult<()>;

    /// Read the current ET and BT.
    async fn read_temperatures(&mut self) -> RoastResult<TemperatureReading>;

    /// Driver metadata.
    fn info(&self) -> DriverInfo;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Write a control value to the roaster.
    ///
    /// The default implementation rejects every channel; drivers that
    /// support control output override it.
    async fn write_control(&mut self, channel: &str, value: f64) -> RoastResult<()> {
        let _ = value;
        Err(roast_common::RoastError::ConfigFault(format!(
            "{} does not support control channel '{channel}'",
            self.info().name
        )))
    }

    /// Read extra sensor channels beyond ET/BT.
    ///
    /// The default implementation returns an empty map.
    async fn read_extra_channels(&mut self) -> RoastResult<HashMap<String, f64>> {
        Ok(HashMap::new())
    }
}
