//! Lifecycle manager for simulated roasting machines: starts and stops
//! [`SimulatorServer`] instances and hands back [`SavedMachine`]s pointing
//! at them.

use crate::server::SimulatorServer;
use roast_common::{
    ChannelConfig, ConnectionConfig, ControlConfig, ModbusConnectionConfig, ModbusRegisterConfig, ProtocolType,
    RoastError, RoastResult, SavedMachine,
};
use std::collections::HashMap;
use uuid::Uuid;

/// Metadata about a running simulator instance.
#[derive(Debug, Clone)]
pub struct SimulatorInfo {
    /// ID of the [`SavedMachine`] this simulator backs.
    pub machine_id: String,
    /// Catalog manufacturer ID the simulator was created from, if any.
    pub manufacturer_id: Option<String>,
    /// Catalog model ID the simulator was created from, if any.
    pub catalog_id: Option<String>,
    /// Display name.
    pub name: String,
    /// Loopback host the simulator is bound to.
    pub host: String,
    /// Port the simulator is bound to.
    pub port: u16,
}

struct RunningSimulator {
    info: SimulatorInfo,
    machine: SavedMachine,
    server: SimulatorServer,
}

/// Tracks every running simulator instance and rejects starting a second
/// simulator for a catalog model that's already running.
#[derive(Default)]
pub struct SimulatorManager {
    running: HashMap<String, RunningSimulator>,
}

impl SimulatorManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a simulator for `manufacturer_id`/`catalog_id`, using `name` as
    /// the machine's display name and `et`/`bt`/`extra_channels`/`controls`
    /// as its register layout. Binds to a free port on `host`.
    ///
    /// # Errors
    ///
    /// Returns [`RoastError::ConfigFault`] if a simulator for the same
    /// `catalog_id` is already running, or [`RoastError::TransportConnect`]
    /// if the listener cannot be bound.
    #[allow(clippy::too_many_arguments)]
    pub async fn start(
        &mut self,
        host: &str,
        manufacturer_id: Option<String>,
        catalog_id: Option<String>,
        name: String,
        et: Option<ChannelConfig>,
        bt: Option<ChannelConfig>,
        extra_channels: Vec<ChannelConfig>,
        controls: Vec<ControlConfig>,
    ) -> RoastResult<SimulatorInfo> {
        if let Some(catalog_id) = &catalog_id {
            if self.running.values().any(|r| r.info.catalog_id.as_ref() == Some(catalog_id)) {
                return Err(RoastError::ConfigFault(format!(
                    "a simulator for catalog model '{catalog_id}' is already running"
                )));
            }
        }

        let machine_id = Uuid::new_v4().to_string();
        let machine = build_simulated_machine(&machine_id, &name, host, &et, &bt, &extra_channels, &controls);

        let server = SimulatorServer::spawn(machine.clone(), host, 0, None).await?;
        let port = server.local_addr().port();

        let mut machine = machine;
        if let ConnectionConfig::Modbus(modbus) = &mut machine.connection {
            modbus.port = port;
        }

        let info = SimulatorInfo {
            machine_id: machine_id.clone(),
            manufacturer_id,
            catalog_id,
            name,
            host: host.to_string(),
            port,
        };

        self.running.insert(machine_id, RunningSimulator { info: info.clone(), machine, server });
        Ok(info)
    }

    /// Return the [`SavedMachine`] bound to a running simulator, pointed at
    /// the simulator's own bound host/port, for callers that want to connect
    /// a driver against it (e.g. the daemon's `--simulate` flag).
    #[must_use]
    pub fn machine(&self, machine_id: &str) -> Option<SavedMachine> {
        self.running.get(machine_id).map(|r| r.machine.clone())
    }

    /// Stop the simulator backing `machine_id`, if one is running.
    pub async fn stop(&mut self, machine_id: &str) -> bool {
        if let Some(running) = self.running.remove(machine_id) {
            running.server.shutdown().await;
            true
        } else {
            false
        }
    }

    /// List every running simulator's metadata.
    #[must_use]
    pub fn list_running(&self) -> Vec<SimulatorInfo> {
        self.running.values().map(|r| r.info.clone()).collect()
    }

    /// Look up a running simulator's metadata by machine ID.
    #[must_use]
    pub fn get(&self, machine_id: &str) -> Option<SimulatorInfo> {
        self.running.get(machine_id).map(|r| r.info.clone())
    }

    /// Stop every running simulator.
    pub async fn stop_all(&mut self) {
        for (_, running) in self.running.drain() {
            running.server.shutdown().await;
        }
    }
}

fn build_simulated_machine(
    machine_id: &str,
    name: &str,
    host: &str,
    et: &Option<ChannelConfig>,
    bt: &Option<ChannelConfig>,
    extra_channels: &[ChannelConfig],
    controls: &[ControlConfig],
) -> SavedMachine {
    SavedMachine {
        id: machine_id.to_string(),
        name: name.to_string(),
        catalog_manufacturer_id: None,
        catalog_model_id: None,
        protocol: ProtocolType::ModbusTcp,
        connection: ConnectionConfig::Modbus(ModbusConnectionConfig {
            host: host.to_string(),
            port: 0,
            baudrate: 19200,
            bytesize: 8,
            parity: "N".to_string(),
            stopbits: 1,
            timeout: 1.0,
            word_order_little: true,
        }),
        sampling_interval_ms: 1000,
        et: et.clone(),
        bt: bt.clone(),
        extra_channels: extra_channels.to_vec(),
        controls: controls.to_vec(),
    }
}

#[cfg(test)]
fn default_channel(name: &str, address: u16, function_code: u8) -> ChannelConfig {
    ChannelConfig {
        name: name.to_string(),
        modbus: Some(ModbusRegisterConfig {
            address,
            function_code,
            device_id: 1,
            divisor: 1,
            mode: "C".to_string(),
            is_float: false,
            is_bcd: false,
        }),
        s7: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_controls() -> Vec<ControlConfig> {
        vec![ControlConfig {
            display_name: "Burner".to_string(),
            channel_id: "burner".to_string(),
            command_template: "writeSingle(1,200,{})".to_string(),
            min: 0.0,
            max: 100.0,
            step: 1.0,
            unit: "%".to_string(),
        }]
    }

    #[tokio::test]
    async fn starts_and_stops_a_simulator() {
        let mut manager = SimulatorManager::new();
        let info = manager
            .start(
                "127.0.0.1",
                Some("acme".to_string()),
                Some("model-1".to_string()),
                "Test Roaster".to_string(),
                Some(default_channel("ET", 100, 4)),
                Some(default_channel("BT", 101, 4)),
                Vec::new(),
                default_controls(),
            )
            .await
            .unwrap();

        assert_ne!(info.port, 0);
        assert_eq!(manager.list_running().len(), 1);
        assert!(manager.get(&info.machine_id).is_some());

        assert!(manager.stop(&info.machine_id).await);
        assert_eq!(manager.list_running().len(), 0);
    }

    #[tokio::test]
    async fn rejects_duplicate_catalog_model() {
        let mut manager = SimulatorManager::new();
        manager
            .start(
                "127.0.0.1",
                None,
                Some("model-1".to_string()),
                "First".to_string(),
                None,
                None,
                Vec::new(),
                Vec::new(),
            )
            .await
            .unwrap();

        let err = manager
            .start(
                "127.0.0.1",
                None,
                Some("model-1".to_string()),
                "Second".to_string(),
                None,
                None,
                Vec::new(),
                Vec::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RoastError::ConfigFault(_)));

        manager.stop_all().await;
    }
}
