//! Async Modbus TCP server exposing a [`ThermalEngine`]'s state as a
//! register map, so a real driver can talk to a simulated roaster exactly
//! as it would a physical one.

use crate::engine::ThermalEngine;
use crate::registers::RegisterMap;
use roast_common::{ChannelConfig, ConnectionConfig, RoastError, RoastResult, SavedMachine};
use roast_fieldbus::command::first_command_address;
use roast_fieldbus::mbap::{ExceptionCode, FunctionCode, MbapHeader};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const THERMAL_STEP_INTERVAL: Duration = Duration::from_millis(500);

struct SharedState {
    engine: Mutex<ThermalEngine>,
    registers: Mutex<RegisterMap>,
    /// `(device_id, address)` -> control channel id, learned from each
    /// control's command template so a client's raw register write can be
    /// fed back into the thermal engine.
    control_map: HashMap<(u8, u16), String>,
    et: Option<ChannelConfig>,
    bt: Option<ChannelConfig>,
    extra_channels: Vec<ChannelConfig>,
    word_order_little: bool,
}

/// A running simulated roaster: a Modbus TCP server backed by a thermal
/// model, accepting connections on a loopback port.
pub struct SimulatorServer {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    thermal_task: JoinHandle<()>,
}

impl SimulatorServer {
    /// Bind a listener for `machine` on `host:port` (`port` 0 picks a free
    /// port) and start serving Modbus requests plus the thermal simulation
    /// loop. Returns the server handle and the address it bound to.
    ///
    /// # Errors
    ///
    /// Returns [`RoastError::TransportConnect`] if the listener cannot be
    /// bound.
    pub async fn spawn(machine: SavedMachine, host: &str, port: u16, seed: Option<u64>) -> RoastResult<Self> {
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|e| RoastError::TransportConnect(format!("failed to bind simulator on {host}:{port}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| RoastError::TransportConnect(format!("failed to read bound address: {e}")))?;

        let word_order_little = match &machine.connection {
            ConnectionConfig::Modbus(c) => c.word_order_little,
            _ => true,
        };

        let control_map = machine
            .controls
            .iter()
            .filter_map(|c| first_command_address(&c.command_template).map(|addr| (addr, c.channel_id.clone())))
            .collect();

        let state = Arc::new(SharedState {
            engine: Mutex::new(ThermalEngine::new(seed)),
            registers: Mutex::new(RegisterMap::new()),
            control_map,
            et: machine.et.clone(),
            bt: machine.bt.clone(),
            extra_channels: machine.extra_channels.clone(),
            word_order_little,
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let accept_state = state.clone();
        let mut accept_shutdown = shutdown_rx.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, peer)) => {
                                let conn_state = accept_state.clone();
                                let mut conn_shutdown = accept_shutdown.clone();
                                tokio::spawn(async move {
                                    tokio::select! {
                                        _ = handle_connection(stream, conn_state) => {}
                                        _ = conn_shutdown.changed() => {}
                                    }
                                    debug!(%peer, "simulator connection closed");
                                });
                            }
                            Err(e) => {
                                warn!(error = %e, "simulator accept failed");
                            }
                        }
                    }
                    _ = accept_shutdown.changed() => break,
                }
            }
        });

        let thermal_state = state;
        let mut thermal_shutdown = shutdown_rx;
        let thermal_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(THERMAL_STEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        step_thermal(&thermal_state).await;
                    }
                    _ = thermal_shutdown.changed() => break,
                }
            }
        });

        info!(%local_addr, "simulator server listening");

        Ok(Self {
            local_addr,
            shutdown: shutdown_tx,
            accept_task,
            thermal_task,
        })
    }

    /// Address the server is listening on.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and shut down the thermal loop, waiting
    /// for both background tasks to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.accept_task.await;
        let _ = self.thermal_task.await;
    }
}

async fn step_thermal(state: &SharedState) {
    let reading = {
        let mut engine = state.engine.lock().await;
        engine.step(THERMAL_STEP_INTERVAL.as_secs_f64())
    };

    let mut registers = state.registers.lock().await;
    if let Some(channel) = &state.et {
        registers.write_modbus_channel(channel, reading.et, state.word_order_little);
    }
    if let Some(channel) = &state.bt {
        registers.write_modbus_channel(channel, reading.bt, state.word_order_little);
    }
    for channel in &state.extra_channels {
        let value = match channel.name.to_lowercase().as_str() {
            "burner" => reading.burner,
            "airflow" | "air" => reading.airflow,
            "drum" => reading.drum,
            _ => continue,
        };
        registers.write_modbus_channel(channel, value, state.word_order_little);
    }
}

async fn handle_connection(mut stream: TcpStream, state: Arc<SharedState>) {
    loop {
        let mut header_buf = [0u8; MbapHeader::SIZE];
        if stream.read_exact(&mut header_buf).await.is_err() {
            return;
        }
        let Ok(header) = MbapHeader::from_bytes(&header_buf) else {
            return;
        };
        let pdu_len = header.length.saturating_sub(1) as usize;
        let mut pdu = vec![0u8; pdu_len];
        if stream.read_exact(&mut pdu).await.is_err() {
            return;
        }

        let response_pdu = dispatch(&state, header.unit_id, &pdu).await;
        let response_header = MbapHeader::new(header.transaction_id, response_pdu.len() as u16, header.unit_id);

        let mut out = Vec::with_capacity(MbapHeader::SIZE + response_pdu.len());
        out.extend_from_slice(&response_header.to_bytes());
        out.extend_from_slice(&response_pdu);
        if stream.write_all(&out).await.is_err() {
            return;
        }
    }
}

async fn dispatch(state: &SharedState, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let Some(&function) = pdu.first() else {
        return exception_pdu(0, ExceptionCode::IllegalFunction);
    };

    match function {
        f if f == FunctionCode::ReadHoldingRegisters as u8 || f == FunctionCode::ReadInputRegisters as u8 => {
            handle_read(state, unit_id, function, pdu).await
        }
        f if f == FunctionCode::WriteSingleRegister as u8 => handle_write_single(state, unit_id, pdu).await,
        f if f == FunctionCode::MaskWriteRegister as u8 => handle_mask_write(state, unit_id, pdu).await,
        other => exception_pdu(other, ExceptionCode::IllegalFunction),
    }
}

async fn handle_read(state: &SharedState, unit_id: u8, function: u8, pdu: &[u8]) -> Vec<u8> {
    if pdu.len() < 5 {
        return exception_pdu(function, ExceptionCode::IllegalDataValue);
    }
    let address = u16::from_be_bytes([pdu[1], pdu[2]]);
    let quantity = u16::from_be_bytes([pdu[3], pdu[4]]);

    let registers = state.registers.lock().await;
    match registers.read_raw(function, unit_id, address, quantity) {
        Ok(values) => {
            let mut response = Vec::with_capacity(2 + values.len() * 2);
            response.push(function);
            response.push((values.len() * 2) as u8);
            for value in values {
                response.extend_from_slice(&value.to_be_bytes());
            }
            response
        }
        Err(_) => exception_pdu(function, ExceptionCode::IllegalDataAddress),
    }
}

async fn handle_write_single(state: &SharedState, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let function = FunctionCode::WriteSingleRegister as u8;
    if pdu.len() < 5 {
        return exception_pdu(function, ExceptionCode::IllegalDataValue);
    }
    let address = u16::from_be_bytes([pdu[1], pdu[2]]);
    let value = u16::from_be_bytes([pdu[3], pdu[4]]);

    state.registers.lock().await.write_raw(3, unit_id, address, value);
    notify_control(state, unit_id, address, value).await;

    pdu.to_vec()
}

async fn handle_mask_write(state: &SharedState, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let function = FunctionCode::MaskWriteRegister as u8;
    if pdu.len() < 7 {
        return exception_pdu(function, ExceptionCode::IllegalDataValue);
    }
    let address = u16::from_be_bytes([pdu[1], pdu[2]]);
    let and_mask = u16::from_be_bytes([pdu[3], pdu[4]]);
    let or_mask = u16::from_be_bytes([pdu[5], pdu[6]]);

    state.registers.lock().await.mask_write(unit_id, address, and_mask, or_mask);
    pdu.to_vec()
}

/// A control write landed on `address`: if that address is one of the
/// control channels learned from the catalog, feed the raw word straight
/// into the thermal engine as a percentage value.
async fn notify_control(state: &SharedState, unit_id: u8, address: u16, value: u16) {
    let Some(channel_id) = state.control_map.get(&(unit_id, address)) else {
        return;
    };
    let mut engine = state.engine.lock().await;
    engine.set_control(channel_id, f64::from(value));
}

fn exception_pdu(function: u8, exception: ExceptionCode) -> Vec<u8> {
    vec![function | 0x80, exception as u8]
}

#[cfg(test)]
mod tests {
    use super::*;
    use roast_common::{ConnectionConfig, ModbusConnectionConfig, ProtocolType};
    use roast_fieldbus::mbap::{build_read_pdu, FunctionCode as Fc};

    fn fixture_machine() -> SavedMachine {
        SavedMachine {
            id: "sim-1".to_string(),
            name: "Test Simulator".to_string(),
            catalog_manufacturer_id: None,
            catalog_model_id: None,
            protocol: ProtocolType::ModbusTcp,
            connection: ConnectionConfig::Modbus(ModbusConnectionConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                baudrate: 19200,
                bytesize: 8,
                parity: "N".to_string(),
                stopbits: 1,
                timeout: 1.0,
                word_order_little: true,
            }),
            sampling_interval_ms: 1000,
            et: Some(ChannelConfig {
                name: "ET".to_string(),
                modbus: Some(roast_common::ModbusRegisterConfig {
                    address: 100,
                    function_code: 4,
                    device_id: 1,
                    divisor: 1,
                    mode: "C".to_string(),
                    is_float: false,
                    is_bcd: false,
                }),
                s7: None,
            }),
            bt: None,
            extra_channels: Vec::new(),
            controls: Vec::new(),
        }
    }

    #[tokio::test]
    async fn binds_to_a_free_port_and_answers_reads() {
        let machine = fixture_machine();
        let server = SimulatorServer::spawn(machine, "127.0.0.1", 0, Some(1)).await.unwrap();
        let addr = server.local_addr();
        assert_ne!(addr.port(), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let pdu = build_read_pdu(Fc::ReadInputRegisters, 100, 1);
        let header = MbapHeader::new(1, pdu.len() as u16, 1);
        let mut request = Vec::new();
        request.extend_from_slice(&header.to_bytes());
        request.extend_from_slice(&pdu);
        stream.write_all(&request).await.unwrap();

        let mut header_buf = [0u8; MbapHeader::SIZE];
        stream.read_exact(&mut header_buf).await.unwrap();
        let response_header = MbapHeader::from_bytes(&header_buf).unwrap();
        let mut response_pdu = vec![0u8; response_header.length as usize - 1];
        stream.read_exact(&mut response_pdu).await.unwrap();

        assert_eq!(response_pdu[0], Fc::ReadInputRegisters as u8);

        server.shutdown().await;
    }
}
