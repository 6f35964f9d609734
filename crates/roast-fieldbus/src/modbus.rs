//! Modbus RTU/TCP driver for roaster communication.
//!
//! Supports every machine in the catalog that uses the Modbus protocol.
//! RTU (serial) addressing is accepted in the configuration but only TCP
//! transport is implemented; see [`ModbusDriver::new`].

use crate::codec::decode_value;
use crate::command::{parse_template, Command};
use crate::driver::{ConnectionState, DriverInfo, RoasterDriver, TemperatureReading};
use crate::mbap::{
    build_mask_write_pdu, build_read_pdu, build_write_single_pdu, parse_read_response,
    FunctionCode, MbapHeader,
};
use async_trait::async_trait;
use roast_common::{ChannelConfig, ConnectionConfig, ControlConfig, ModbusRegisterConfig, ProtocolType, RoastError, RoastResult, SavedMachine};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{info, trace, warn};

/// Driver for Modbus RTU and TCP roasting machines, communicating over TCP.
pub struct ModbusDriver {
    machine: SavedMachine,
    host: String,
    port: u16,
    timeout: Duration,
    stream: Option<TcpStream>,
    state: ConnectionState,
    transaction_id: u16,
    controls: HashMap<String, ControlConfig>,
}

impl ModbusDriver {
    /// Build a driver for `machine`, using `timeout` for every I/O
    /// operation.
    ///
    /// # Errors
    ///
    /// Returns [`RoastError::ConfigFault`] if `machine`'s protocol isn't a
    /// Modbus variant or its connection isn't [`ConnectionConfig::Modbus`].
    pub fn new(machine: SavedMachine, timeout: Duration) -> RoastResult<Self> {
        if !matches!(machine.protocol, ProtocolType::ModbusRtu | ProtocolType::ModbusTcp) {
            return Err(RoastError::ConfigFault(format!(
                "ModbusDriver requires modbus_rtu or modbus_tcp, got {:?}",
                machine.protocol
            )));
        }
        let ConnectionConfig::Modbus(conn) = &machine.connection else {
            return Err(RoastError::ConfigFault(
                "machine protocol is Modbus but connection config is not".to_string(),
            ));
        };
        let host = conn.host.clone();
        let port = conn.port;

        let controls = machine
            .controls
            .iter()
            .map(|c| (c.channel_id.clone(), c.clone()))
            .collect();

        Ok(Self {
            machine,
            host,
            port,
            timeout,
            stream: None,
            state: ConnectionState::Disconnected,
            transaction_id: 0,
            controls,
        })
    }

    fn next_transaction_id(&mut self) -> u16 {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        self.transaction_id
    }

    fn word_order_little(&self) -> bool {
        match &self.machine.connection {
            ConnectionConfig::Modbus(c) => c.word_order_little,
            _ => true,
        }
    }

    fn unit_id_for(config: &ModbusRegisterConfig) -> u8 {
        config.device_id
    }

    async fn send_request(&mut self, unit_id: u8, pdu: &[u8]) -> RoastResult<Vec<u8>> {
        let transaction_id = self.next_transaction_id();
        let header = MbapHeader::new(transaction_id, pdu.len() as u16, unit_id);

        let mut request = Vec::with_capacity(MbapHeader::SIZE + pdu.len());
        request.extend_from_slice(&header.to_bytes());
        request.extend_from_slice(pdu);

        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| RoastError::TransportConnect("not connected to Modbus device".to_string()))?;

        trace!(transaction_id, pdu_len = pdu.len(), "sending Modbus request");

        let write_result = tokio::time::timeout(self.timeout, stream.write_all(&request)).await;
        match write_result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.mark_disconnected();
                return Err(RoastError::TransientIo(format!("send failed: {e}")));
            }
            Err(_) => {
                self.mark_disconnected();
                return Err(RoastError::TransientIo("send timed out".to_string()));
            }
        }

        let mut header_buf = [0u8; MbapHeader::SIZE];
        let stream = self.stream.as_mut().expect("checked above");
        match tokio::time::timeout(self.timeout, stream.read_exact(&mut header_buf)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                self.mark_disconnected();
                return Err(RoastError::TransientIo(format!("receive header failed: {e}")));
            }
            Err(_) => {
                self.mark_disconnected();
                return Err(RoastError::TransientIo("receive header timed out".to_string()));
            }
        }

        let response_header = MbapHeader::from_bytes(&header_buf)?;
        if response_header.transaction_id != transaction_id {
            return Err(RoastError::InvalidFrame(format!(
                "transaction ID mismatch: expected {transaction_id}, got {}",
                response_header.transaction_id
            )));
        }

        let pdu_len = response_header.length.saturating_sub(1) as usize;
        let mut pdu_buf = vec![0u8; pdu_len];
        let stream = self.stream.as_mut().expect("checked above");
        match tokio::time::timeout(self.timeout, stream.read_exact(&mut pdu_buf)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                self.mark_disconnected();
                return Err(RoastError::TransientIo(format!("receive PDU failed: {e}")));
            }
            Err(_) => {
                self.mark_disconnected();
                return Err(RoastError::TransientIo("receive PDU timed out".to_string()));
            }
        }

        Ok(pdu_buf)
    }

    fn mark_disconnected(&mut self) {
        self.stream = None;
        self.state = ConnectionState::Error;
    }

    async fn read_register(&mut self, config: &ModbusRegisterConfig) -> RoastResult<f64> {
        let count = if config.is_float { 2 } else { 1 };
        let function = match config.function_code {
            3 => FunctionCode::ReadHoldingRegisters,
            4 => FunctionCode::ReadInputRegisters,
            other => {
                return Err(RoastError::ConfigFault(format!(
                    "unsupported function code: {other}"
                )))
            }
        };
        let pdu = build_read_pdu(function, config.address, count);
        let response = self.send_request(Self::unit_id_for(config), &pdu).await?;
        let registers = parse_read_response(&response, function)?;
        if registers.len() < usize::from(count) {
            return Err(RoastError::InvalidFrame(
                "response carried fewer registers than requested".to_string(),
            ));
        }
        Ok(decode_value(config, &registers, self.word_order_little()))
    }

    async fn read_channel(&mut self, channel: &ChannelConfig) -> Option<RoastResult<f64>> {
        let config = channel.modbus.clone()?;
        Some(self.read_register(&config).await)
    }

    async fn execute_single(&mut self, command: Command) -> RoastResult<()> {
        match command {
            Command::WriteSingle {
                device_id,
                address,
                value,
            } => {
                let pdu = build_write_single_pdu(address, value);
                self.send_request(device_id, &pdu).await?;
            }
            Command::MaskWrite {
                device_id,
                address,
                or_mask,
                and_mask,
            } => {
                let pdu = build_mask_write_pdu(address, and_mask, or_mask);
                self.send_request(device_id, &pdu).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RoasterDriver for ModbusDriver {
    async fn connect(&mut self) -> RoastResult<()> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }
        self.state = ConnectionState::Connecting;

        let addr = format!("{}:{}", self.host, self.port);
        let connect = tokio::time::timeout(self.timeout, TcpStream::connect(&addr)).await;
        let stream = match connect {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.state = ConnectionState::Error;
                return Err(RoastError::TransportConnect(format!("connect to {addr} failed: {e}")));
            }
            Err(_) => {
                self.state = ConnectionState::Error;
                return Err(RoastError::TransportConnect(format!("connect to {addr} timed out")));
            }
        };
        stream
            .set_nodelay(true)
            .map_err(|e| RoastError::TransportConnect(format!("failed to set TCP_NODELAY: {e}")))?;

        self.stream = Some(stream);
        self.state = ConnectionState::Connected;
        info!(machine = %self.machine.name, %addr, "connected to Modbus device");
        Ok(())
    }

    async fn disconnect(&mut self) -> RoastResult<()> {
        self.stream = None;
        self.state = ConnectionState::Disconnected;
        info!(machine = %self.machine.name, "disconnected from Modbus device");
        Ok(())
    }

    async fn read_temperatures(&mut self) -> RoastResult<TemperatureReading> {
        if self.state != ConnectionState::Connected {
            return Err(RoastError::TransportConnect("not connected to Modbus device".to_string()));
        }

        let et = if let Some(channel) = self.machine.et.clone() {
            match self.read_channel(&channel).await {
                Some(result) => result?,
                None => 0.0,
            }
        } else {
            0.0
        };
        let bt = if let Some(channel) = self.machine.bt.clone() {
            match self.read_channel(&channel).await {
                Some(result) => result?,
                None => 0.0,
            }
        } else {
            0.0
        };

        Ok(TemperatureReading {
            et,
            bt,
            timestamp_ms: 0.0,
        })
    }

    fn info(&self) -> DriverInfo {
        DriverInfo {
            name: if self.machine.protocol == ProtocolType::ModbusRtu {
                "Modbus RTU".to_string()
            } else {
                "Modbus TCP".to_string()
            },
            manufacturer: self
                .machine
                .catalog_manufacturer_id
                .clone()
                .unwrap_or_else(|| "Custom".to_string()),
            model: self.machine.name.clone(),
            protocol: self.machine.protocol.to_string(),
        }
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    async fn write_control(&mut self, channel: &str, value: f64) -> RoastResult<()> {
        if self.state != ConnectionState::Connected {
            return Err(RoastError::TransportConnect("not connected to Modbus device".to_string()));
        }

        let control = self
            .controls
            .get(channel)
            .cloned()
            .ok_or_else(|| RoastError::ConfigFault(format!("control channel '{channel}' not configured")))?;

        if control.command_template.is_empty() {
            return Err(RoastError::ConfigFault(format!(
                "control '{channel}' has no command template"
            )));
        }

        let commands = parse_template(&control.command_template, value as i64)?;
        for command in commands {
            self.execute_single(command).await?;
        }
        Ok(())
    }

    async fn read_extra_channels(&mut self) -> RoastResult<HashMap<String, f64>> {
        if self.state != ConnectionState::Connected {
            return Err(RoastError::TransportConnect("not connected to Modbus device".to_string()));
        }

        let mut result = HashMap::new();
        let channels = self.machine.extra_channels.clone();
        for channel in &channels {
            if channel.modbus.is_none() {
                continue;
            }
            match self.read_channel(channel).await {
                Some(Ok(value)) => {
                    result.insert(channel.name.clone(), value);
                }
                Some(Err(e)) => {
                    warn!(channel = %channel.name, error = %e, "failed to read extra channel");
                    result.insert(channel.name.clone(), 0.0);
                }
                None => {}
            }
        }
        Ok(result)
    }
}
