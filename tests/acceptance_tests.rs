//! Workspace acceptance tests for the roast gateway.
//!
//! Exercises the full closed loop across crates the way a real deployment
//! would use them: a simulated roaster (`roast-simulator`) speaking Modbus
//! TCP, driven through the real driver (`roast-fieldbus`) by the machine
//! manager (`roast-manager`), with readings and a control round-trip
//! observed exactly as a live-streaming client would see them.

use roast_common::{ChannelConfig, ConnectionConfig, ControlConfig, GatewayConfig, ModbusConnectionConfig, ModbusRegisterConfig, ProtocolType, SavedMachine};
use roast_manager::MachineManager;
use roast_simulator::SimulatorManager;
use std::time::Duration;

fn channel(name: &str, address: u16) -> ChannelConfig {
    ChannelConfig {
        name: name.to_string(),
        modbus: Some(ModbusRegisterConfig {
            address,
            function_code: 4,
            device_id: 1,
            divisor: 1,
            mode: "C".to_string(),
            is_float: false,
            is_bcd: false,
        }),
        s7: None,
    }
}

fn burner_control() -> ControlConfig {
    ControlConfig {
        display_name: "Burner".to_string(),
        channel_id: "burner".to_string(),
        command_template: "writeSingle(1,200,{})".to_string(),
        min: 0.0,
        max: 100.0,
        step: 1.0,
        unit: "%".to_string(),
    }
}

#[tokio::test]
async fn closed_loop_simulator_streams_readings_and_applies_controls() {
    let mut simulators = SimulatorManager::new();
    let info = simulators
        .start(
            "127.0.0.1",
            Some("test-manufacturer".to_string()),
            Some("closed-loop-model".to_string()),
            "Test Roaster".to_string(),
            Some(channel("ET", 100)),
            Some(channel("BT", 101)),
            Vec::new(),
            vec![burner_control()],
        )
        .await
        .expect("simulator should start");

    let machine: SavedMachine = simulators.machine(&info.machine_id).expect("simulator's bound machine should be recorded");
    assert!(matches!(machine.connection, ConnectionConfig::Modbus(ModbusConnectionConfig { port, .. }) if port == info.port));
    assert_eq!(machine.protocol, ProtocolType::ModbusTcp);

    let config = GatewayConfig {
        driver_timeout: Duration::from_millis(500),
        ..GatewayConfig::default()
    };
    let manager = MachineManager::new(config);

    manager.connect_machine(machine.clone()).await.expect("manager should connect to the simulator");
    assert!(manager.is_connected(&info.machine_id).await);

    let (observer_id, mut rx) = manager.add_observer(&info.machine_id).await.expect("a connected machine accepts observers");

    let first_reading = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match rx.recv().await.expect("observer channel should stay open") {
                roast_common::ServerMessage::Temperature { et, bt, .. } => return (et, bt),
                _ => continue,
            }
        }
    })
    .await
    .expect("a temperature reading should arrive within the sampling interval");

    let (et, bt) = first_reading;
    assert!((0.0..=350.0).contains(&et), "ET {et} out of the engine's clamp range");
    assert!((0.0..=350.0).contains(&bt), "BT {bt} out of the engine's clamp range");

    let ack = manager
        .handle_control(&info.machine_id, "burner", 0.8, true)
        .await
        .expect("a connected machine with a matching control applies the write");
    match ack {
        roast_common::ServerMessage::ControlAck { channel, value, applied, enabled, .. } => {
            assert_eq!(channel, "burner");
            assert!((value - 0.8).abs() < 1e-9);
            assert!(enabled);
            assert!(applied, "burner write should reach the simulator over the real driver");
        }
        other => panic!("expected a control acknowledgement, got {other:?}"),
    }

    let unknown_ack = manager
        .handle_control(&info.machine_id, "not-a-real-channel", 0.5, true)
        .await
        .expect("a connected machine always replies to a control frame");
    match unknown_ack {
        roast_common::ServerMessage::ControlAck { applied, message, .. } => {
            assert!(!applied);
            assert!(message.is_some());
        }
        other => panic!("expected a control acknowledgement, got {other:?}"),
    }

    manager.remove_observer(&info.machine_id, observer_id).await;
    manager.disconnect_machine(&info.machine_id).await;
    assert!(!manager.is_connected(&info.machine_id).await);

    assert!(simulators.stop(&info.machine_id).await);
    assert_eq!(simulators.list_running().len(), 0);
}
