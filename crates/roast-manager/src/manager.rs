//! Machine lifecycle manager: connect/disconnect, control writes, session
//! commands, and sync replay for every live machine.

use crate::instance::{sample_once, InstanceState, TickOutcome};
use roast_common::{ControlConfig, GatewayConfig, RoastError, RoastResult, SavedMachine, ServerMessage};
use roast_fieldbus::factory::create_driver;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A connected machine's runtime handle: shared state plus the sampling
/// loop task driving it.
struct MachineHandle {
    state: Arc<Mutex<InstanceState>>,
    controls: Vec<ControlConfig>,
    shutdown: watch::Sender<bool>,
    sampling_task: JoinHandle<()>,
}

/// Owns every connected machine's runtime state and drives its sampling
/// loop. The instance map is only ever mutated from `connect_machine` and
/// `disconnect_machine`, so it needs no lock broader than the map itself.
pub struct MachineManager {
    instances: Mutex<HashMap<String, MachineHandle>>,
    config: GatewayConfig,
}

impl MachineManager {
    /// Create a manager using `config` for sampling/timeout/error-budget
    /// defaults.
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Connect `machine`, spawning its sampling loop. Idempotent: if the
    /// machine is already connected, this is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if no driver exists for the machine's protocol or
    /// the initial connect attempt fails.
    pub async fn connect_machine(&self, machine: SavedMachine) -> RoastResult<()> {
        let machine_id = machine.id.clone();
        let mut instances = self.instances.lock().await;
        if instances.contains_key(&machine_id) {
            return Ok(());
        }

        let mut driver = create_driver(machine.clone(), self.config.driver_timeout)?;
        driver.connect().await?;

        let interval = std::time::Duration::from_millis(u64::from(machine.clamped_sampling_interval_ms()));
        let state = Arc::new(Mutex::new(InstanceState::new(
            driver,
            machine.name.clone(),
            self.config.ring_capacity,
        )));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let loop_state = Arc::clone(&state);
        let loop_machine_id = machine_id.clone();
        let max_consecutive_errors = self.config.max_consecutive_errors;
        let sampling_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        info!(machine_id = %loop_machine_id, "sampling loop stopped");
                        return;
                    }
                    () = tokio::time::sleep(interval) => {
                        let outcome = {
                            let mut guard = loop_state.lock().await;
                            sample_once(&mut guard, &loop_machine_id, max_consecutive_errors).await
                        };
                        match outcome {
                            TickOutcome::Continue | TickOutcome::Recoverable => {}
                            TickOutcome::Terminal => {
                                warn!(machine_id = %loop_machine_id, "sampling loop exiting: error budget exhausted");
                                return;
                            }
                        }
                    }
                }
            }
        });

        {
            let mut guard = state.lock().await;
            let driver_state = guard.driver.state().to_string();
            let driver_name = guard.driver.info().name;
            guard.broadcast(ServerMessage::Connection {
                driver_state,
                driver_name,
                message: String::new(),
            });
        }

        instances.insert(
            machine_id,
            MachineHandle {
                state,
                controls: machine.controls,
                shutdown: shutdown_tx,
                sampling_task,
            },
        );
        Ok(())
    }

    /// Disconnect `machine_id`: cancel and await the sampling task,
    /// disconnect the driver (errors logged, never propagated), broadcast a
    /// final connection frame, and drop the instance.
    pub async fn disconnect_machine(&self, machine_id: &str) {
        let handle = {
            let mut instances = self.instances.lock().await;
            instances.remove(machine_id)
        };
        let Some(handle) = handle else {
            return;
        };

        let _ = handle.shutdown.send(true);
        if let Err(e) = handle.sampling_task.await {
            if !e.is_cancelled() {
                error!(%machine_id, error = %e, "sampling task panicked");
            }
        }

        let mut guard = handle.state.lock().await;
        if let Err(e) = guard.driver.disconnect().await {
            warn!(%machine_id, error = %e, "error disconnecting driver");
        }
        let driver_state = guard.driver.state().to_string();
        let driver_name = guard.driver.info().name;
        guard.broadcast(ServerMessage::Connection {
            driver_state,
            driver_name,
            message: String::new(),
        });
    }

    /// Attach an observer to `machine_id`'s broadcast fan-out, returning an
    /// id usable with [`Self::remove_observer`] and a receiver for frames.
    ///
    /// Returns `None` if the machine isn't connected.
    pub async fn add_observer(&self, machine_id: &str) -> Option<(u64, mpsc::UnboundedReceiver<ServerMessage>)> {
        let instances = self.instances.lock().await;
        let handle = instances.get(machine_id)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut guard = handle.state.lock().await;
        let id = guard.add_observer(tx);
        Some((id, rx))
    }

    /// Detach observer `id` from `machine_id`'s fan-out.
    pub async fn remove_observer(&self, machine_id: &str, id: u64) {
        let instances = self.instances.lock().await;
        if let Some(handle) = instances.get(machine_id) {
            let mut guard = handle.state.lock().await;
            guard.remove_observer(id);
        }
    }

    /// Write a normalized control value, scaling it to the channel's native
    /// range and logging it into the session.
    ///
    /// Returns `None` if `machine_id` isn't connected; an unknown channel
    /// yields a `ControlAck` with `applied: false` rather than `None`, the
    /// same way an unconnected driver write does.
    pub async fn handle_control(&self, machine_id: &str, channel: &str, value: f64, enabled: bool) -> Option<ServerMessage> {
        let instances = self.instances.lock().await;
        let handle = instances.get(machine_id)?;

        let Some(control) = handle.controls.iter().find(|c| c.channel_id == channel) else {
            return Some(ServerMessage::ControlAck {
                channel: channel.to_string(),
                value,
                applied: false,
                enabled,
                message: Some(format!("unknown control channel: {channel}")),
            });
        };

        let write_value = if enabled { value } else { 0.0 };
        let native = control.min + write_value * (control.max - control.min);

        let mut guard = handle.state.lock().await;
        let (applied, message) = match guard.driver.write_control(channel, native).await {
            Ok(()) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        };

        let timestamp_ms = guard.elapsed_ms();
        guard.session.add_control_change(timestamp_ms, channel, native);

        Some(ServerMessage::ControlAck {
            channel: channel.to_string(),
            value,
            applied,
            enabled,
            message,
        })
    }

    /// Dispatch a session lifecycle command. `sync` is handled separately by
    /// [`Self::get_sync_messages`], not here.
    ///
    /// Returns `None` if `machine_id` isn't connected.
    pub async fn handle_session_command(
        &self,
        machine_id: &str,
        action: &str,
        event_type: Option<&str>,
    ) -> Option<ServerMessage> {
        let instances = self.instances.lock().await;
        let handle = instances.get(machine_id)?;
        let mut guard = handle.state.lock().await;

        let result = match action {
            "start_monitoring" => guard.session.start_monitoring().map(|()| {
                guard.reset_clock();
            }),
            "stop_monitoring" => guard.session.stop_monitoring(),
            "start_recording" => guard.session.start_recording().map(|()| {
                guard.reset_clock();
            }),
            "stop_recording" => guard.session.stop_recording(),
            "mark_event" => {
                let Some(event_type) = event_type else {
                    return Some(ServerMessage::Error {
                        code: "INVALID_MESSAGE".to_string(),
                        message: "mark_event requires event_type".to_string(),
                        recoverable: true,
                    });
                };
                let timestamp_ms = guard.elapsed_ms();
                guard.session.add_event(event_type, timestamp_ms, false)
            }
            "reset" => {
                guard.session.reset();
                guard.reset_clock();
                Ok(())
            }
            other => {
                return Some(ServerMessage::Error {
                    code: "INVALID_MESSAGE".to_string(),
                    message: format!("unknown command '{other}'"),
                    recoverable: true,
                });
            }
        };

        match result {
            Ok(()) => Some(ServerMessage::State {
                state: guard.session.state().to_string(),
                previous_state: guard.session.previous_state().map_or_else(String::new, |s| s.to_string()),
            }),
            Err(e) => Some(ServerMessage::Error {
                code: "INVALID_STATE_TRANSITION".to_string(),
                message: e.to_string(),
                recoverable: true,
            }),
        }
    }

    /// The ring-buffer suffix strictly newer than `since_ms`, as
    /// `Temperature` frames, for a reconnecting observer to replay.
    ///
    /// Returns `None` if `machine_id` isn't connected.
    pub async fn get_sync_messages(&self, machine_id: &str, since_ms: f64) -> Option<Vec<ServerMessage>> {
        let instances = self.instances.lock().await;
        let handle = instances.get(machine_id)?;
        let guard = handle.state.lock().await;

        Some(
            guard
                .ring
                .iter()
                .filter(|s| s.timestamp_ms > since_ms)
                .map(|s| ServerMessage::Temperature {
                    timestamp_ms: s.timestamp_ms,
                    et: s.et,
                    bt: s.bt,
                    et_ror: s.et_ror,
                    bt_ror: s.bt_ror,
                    extra: s.extra.clone(),
                })
                .collect(),
        )
    }

    /// Whether `machine_id` currently has a connected instance.
    pub async fn is_connected(&self, machine_id: &str) -> bool {
        self.instances.lock().await.contains_key(machine_id)
    }

    /// The session's current state, e.g. for the state frame sent when an
    /// observer attaches.
    pub async fn session_state(&self, machine_id: &str) -> Option<String> {
        let instances = self.instances.lock().await;
        let handle = instances.get(machine_id)?;
        let guard = handle.state.lock().await;
        Some(guard.session.state().to_string())
    }

    /// The driver's current connection state and human name, for the
    /// connection frame sent when an observer attaches.
    pub async fn driver_status(&self, machine_id: &str) -> Option<(String, String)> {
        let instances = self.instances.lock().await;
        let handle = instances.get(machine_id)?;
        let guard = handle.state.lock().await;
        Some((guard.driver.state().to_string(), guard.driver.info().name))
    }

    /// Broadcast `message` to every observer of `machine_id` except
    /// `exclude`, for a command reply that's already been sent directly to
    /// its caller.
    pub async fn broadcast_except(&self, machine_id: &str, exclude: u64, message: ServerMessage) {
        let instances = self.instances.lock().await;
        if let Some(handle) = instances.get(machine_id) {
            let mut guard = handle.state.lock().await;
            guard.broadcast_except(exclude, message);
        }
    }

    /// Disconnect every connected machine. Cooperative: every machine is
    /// stopped even if an earlier one errors.
    pub async fn disconnect_all(&self) {
        let ids: Vec<String> = self.instances.lock().await.keys().cloned().collect();
        for id in ids {
            self.disconnect_machine(&id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use roast_common::{ConnectionConfig, ModbusConnectionConfig, ProtocolType};
    use roast_fieldbus::{ConnectionState, DriverInfo, RoasterDriver, TemperatureReading};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubDriver {
        reads: Arc<AtomicU32>,
        fail: bool,
    }

    #[async_trait]
    impl RoasterDriver for StubDriver {
        async fn connect(&mut self) -> RoastResult<()> {
            Ok(())
        }

        async fn disconnect(&mut self) -> RoastResult<()> {
            Ok(())
        }

        async fn read_temperatures(&mut self) -> RoastResult<TemperatureReading> {
            if self.fail {
                return Err(RoastError::TransientIo("stub failure".to_string()));
            }
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(TemperatureReading {
                et: 100.0 + f64::from(n),
                bt: 90.0 + f64::from(n),
                timestamp_ms: 0.0,
            })
        }

        fn info(&self) -> DriverInfo {
            DriverInfo {
                name: "Stub".to_string(),
                manufacturer: "Test".to_string(),
                model: "Test".to_string(),
                protocol: "stub".to_string(),
            }
        }

        fn state(&self) -> ConnectionState {
            ConnectionState::Connected
        }

        async fn write_control(&mut self, _channel: &str, _value: f64) -> RoastResult<()> {
            Ok(())
        }
    }

    fn test_machine(id: &str, port: u16) -> SavedMachine {
        SavedMachine {
            id: id.to_string(),
            name: "Test Roaster".to_string(),
            catalog_manufacturer_id: None,
            catalog_model_id: None,
            protocol: ProtocolType::ModbusTcp,
            connection: ConnectionConfig::Modbus(ModbusConnectionConfig {
                host: "127.0.0.1".to_string(),
                port,
                baudrate: 19200,
                bytesize: 8,
                parity: "N".to_string(),
                stopbits: 1,
                timeout: 1.0,
                word_order_little: true,
            }),
            sampling_interval_ms: 500,
            et: None,
            bt: None,
            extra_channels: Vec::new(),
            controls: Vec::new(),
        }
    }

    #[tokio::test]
    async fn control_scaling_matches_worked_example() {
        // min=35, max=60, enabled value 0.5 -> native 47.5.
        let control = roast_common::ControlConfig {
            display_name: "Burner".to_string(),
            channel_id: "burner".to_string(),
            command_template: String::new(),
            min: 35.0,
            max: 60.0,
            step: 1.0,
            unit: String::new(),
        };

        let manager = MachineManager::new(GatewayConfig::default());
        let machine_id = "m1".to_string();
        let state = Arc::new(Mutex::new(InstanceState::new(
            Box::new(StubDriver {
                reads: Arc::new(AtomicU32::new(0)),
                fail: false,
            }),
            "Test".to_string(),
            120,
        )));
        let (shutdown_tx, _rx) = watch::channel(false);
        manager.instances.lock().await.insert(
            machine_id.clone(),
            MachineHandle {
                state,
                controls: vec![control],
                shutdown: shutdown_tx,
                sampling_task: tokio::spawn(async {}),
            },
        );

        let ack = manager.handle_control(&machine_id, "burner", 0.5, true).await.unwrap();
        match ack {
            ServerMessage::ControlAck { applied, value, .. } => {
                assert!(applied);
                assert_eq!(value, 0.5);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn session_lifecycle_round_trip() {
        let manager = MachineManager::new(GatewayConfig::default());
        let machine_id = "m1".to_string();
        let state = Arc::new(Mutex::new(InstanceState::new(
            Box::new(StubDriver {
                reads: Arc::new(AtomicU32::new(0)),
                fail: false,
            }),
            "Test".to_string(),
            120,
        )));
        let (shutdown_tx, _rx) = watch::channel(false);
        manager.instances.lock().await.insert(
            machine_id.clone(),
            MachineHandle {
                state,
                controls: Vec::new(),
                shutdown: shutdown_tx,
                sampling_task: tokio::spawn(async {}),
            },
        );

        let reply = manager
            .handle_session_command(&machine_id, "start_monitoring", None)
            .await
            .unwrap();
        assert!(matches!(reply, ServerMessage::State { state, .. } if state == "monitoring"));

        let err = manager.handle_session_command(&machine_id, "mark_event", None).await.unwrap();
        assert!(matches!(err, ServerMessage::Error { code, .. } if code == "INVALID_MESSAGE"));

        let reply = manager
            .handle_session_command(&machine_id, "start_recording", None)
            .await
            .unwrap();
        assert!(matches!(reply, ServerMessage::State { state, .. } if state == "recording"));
    }

    #[tokio::test]
    async fn connect_is_idempotent_and_disconnect_removes_instance() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let manager = MachineManager::new(GatewayConfig::default());
        let machine = test_machine("m-connect", port);

        manager.connect_machine(machine.clone()).await.unwrap();
        assert!(manager.is_connected("m-connect").await);

        manager.connect_machine(machine).await.unwrap();
        assert!(manager.is_connected("m-connect").await);

        manager.disconnect_machine("m-connect").await;
        assert!(!manager.is_connected("m-connect").await);
    }

    #[tokio::test]
    async fn sync_returns_only_samples_newer_than_since() {
        let manager = MachineManager::new(GatewayConfig::default());
        let machine_id = "m1".to_string();
        let mut instance_state = InstanceState::new(
            Box::new(StubDriver {
                reads: Arc::new(AtomicU32::new(0)),
                fail: false,
            }),
            "Test".to_string(),
            120,
        );
        for (ts, et) in [(1000.0, 100.0), (1500.0, 101.0), (2000.0, 102.0)] {
            instance_state.ring.push(crate::sample::Sample {
                timestamp_ms: ts,
                et,
                bt: et - 10.0,
                et_ror: 0.0,
                bt_ror: 0.0,
                extra: HashMap::new(),
            });
        }
        let state = Arc::new(Mutex::new(instance_state));
        let (shutdown_tx, _rx) = watch::channel(false);
        manager.instances.lock().await.insert(
            machine_id.clone(),
            MachineHandle {
                state,
                controls: Vec::new(),
                shutdown: shutdown_tx,
                sampling_task: tokio::spawn(async {}),
            },
        );

        let synced = manager.get_sync_messages(&machine_id, 1200.0).await.unwrap();
        assert_eq!(synced.len(), 2);
    }
}
