//! User-saved machine configurations.

use crate::catalog::{ChannelConfig, ConnectionConfig, ControlConfig, ProtocolType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user-configured roasting machine, either derived from a catalog model
/// with overrides or fully custom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedMachine {
    /// Unique identifier, generated on creation.
    #[serde(default = "new_machine_id")]
    pub id: String,
    /// User-assigned display name.
    pub name: String,

    /// Catalog manufacturer this machine was created from, if any.
    #[serde(default)]
    pub catalog_manufacturer_id: Option<String>,
    /// Catalog model this machine was created from, if any.
    #[serde(default)]
    pub catalog_model_id: Option<String>,

    /// Communication protocol.
    pub protocol: ProtocolType,
    /// Connection parameters.
    pub connection: ConnectionConfig,
    /// Sampling interval in milliseconds, clamped to [500, 10000].
    #[serde(default = "default_sampling_interval_ms")]
    pub sampling_interval_ms: u32,

    /// Environment temperature channel.
    #[serde(default)]
    pub et: Option<ChannelConfig>,
    /// Bean temperature channel.
    #[serde(default)]
    pub bt: Option<ChannelConfig>,
    /// Auxiliary channels beyond ET/BT.
    #[serde(default)]
    pub extra_channels: Vec<ChannelConfig>,

    /// Control sliders exposed by this machine.
    #[serde(default)]
    pub controls: Vec<ControlConfig>,
}

fn new_machine_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_sampling_interval_ms() -> u32 {
    3000
}

impl SavedMachine {
    /// Sampling interval clamped to the allowed range, as a `u32` in
    /// milliseconds.
    #[must_use]
    pub fn clamped_sampling_interval_ms(&self) -> u32 {
        self.sampling_interval_ms.clamp(500, 10_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ConnectionConfig, ModbusConnectionConfig};

    #[test]
    fn sampling_interval_clamps_to_bounds() {
        let mut m = SavedMachine {
            id: new_machine_id(),
            name: "Test Roaster".into(),
            catalog_manufacturer_id: None,
            catalog_model_id: None,
            protocol: ProtocolType::ModbusTcp,
            connection: ConnectionConfig::Modbus(ModbusConnectionConfig {
                host: "127.0.0.1".into(),
                port: 502,
                baudrate: 19200,
                bytesize: 8,
                parity: "N".into(),
                stopbits: 1,
                timeout: 1.0,
                word_order_little: true,
            }),
            sampling_interval_ms: 50,
            et: None,
            bt: None,
            extra_channels: Vec::new(),
            controls: Vec::new(),
        };
        assert_eq!(m.clamped_sampling_interval_ms(), 500);
        m.sampling_interval_ms = 50_000;
        assert_eq!(m.clamped_sampling_interval_ms(), 10_000);
    }
}
