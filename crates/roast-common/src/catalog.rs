//! Catalog data model — static descriptions of known roasting machines.
//!
//! The catalog is read-only reference data: a list of manufacturers and
//! models with their default register maps and connection parameters.
//! Loading catalog files from disk is out of scope for this system; callers
//! hand a parsed [`CatalogModel`] to the pieces that need one (the machine
//! manager, the simulator lifecycle manager).

use serde::{Deserialize, Serialize};

/// Communication protocol for a catalog entry or saved machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolType {
    /// Modbus RTU (serial).
    ModbusRtu,
    /// Modbus TCP.
    ModbusTcp,
    /// Plain serial link (not implemented by any driver).
    Serial,
    /// Siemens S7 (not implemented by any driver).
    S7,
}

impl std::fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ModbusRtu => "modbus_rtu",
            Self::ModbusTcp => "modbus_tcp",
            Self::Serial => "serial",
            Self::S7 => "s7",
        };
        write!(f, "{s}")
    }
}

/// Configuration for reading a single Modbus register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModbusRegisterConfig {
    /// Register address (zero-based, protocol-level).
    pub address: u16,
    /// Function code: 3 = holding registers, 4 = input registers.
    #[serde(default = "default_function_code")]
    pub function_code: u8,
    /// Slave/unit ID, 0-247.
    #[serde(default = "default_device_id")]
    pub device_id: u8,
    /// Divisor selector: 0 = none, 1 = /10, 2 = /100, 3 = /1000.
    #[serde(default)]
    pub divisor: u8,
    /// Temperature mode: "C" = Celsius, "F" = Fahrenheit, "" = raw.
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Decode/encode as 32-bit IEEE-754 float across two registers.
    #[serde(default)]
    pub is_float: bool,
    /// Decode/encode as binary-coded decimal.
    #[serde(default)]
    pub is_bcd: bool,
}

fn default_function_code() -> u8 {
    3
}

fn default_device_id() -> u8 {
    1
}

fn default_mode() -> String {
    "C".to_string()
}

/// A Siemens S7 register descriptor. Recognized so catalog data round-trips,
/// but no driver implements S7 communication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S7RegisterConfig {
    /// S7 memory area (6 = DB, 0 = PE, 1 = PA, 2 = MK).
    #[serde(default = "default_s7_area")]
    pub area: u8,
    /// Data block number.
    #[serde(default = "default_s7_db_nr")]
    pub db_nr: u16,
    /// Byte offset within the block.
    pub start: u16,
    /// 0 = int16, 1 = float32, 2 = intFloat.
    #[serde(default)]
    pub value_type: u8,
    /// 0 = raw, 1 = Celsius, 2 = Fahrenheit.
    #[serde(default = "default_s7_mode")]
    pub mode: u8,
    /// 0 = none, 1 = /10, 2 = /100.
    #[serde(default)]
    pub div: u8,
}

fn default_s7_area() -> u8 {
    6
}
fn default_s7_db_nr() -> u16 {
    2
}
fn default_s7_mode() -> u8 {
    1
}

/// A named data channel (temperature or auxiliary) backed by one transport's
/// register config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Display name of the channel.
    pub name: String,
    /// Modbus register backing this channel, if any.
    #[serde(default)]
    pub modbus: Option<ModbusRegisterConfig>,
    /// S7 register backing this channel, if any.
    #[serde(default)]
    pub s7: Option<S7RegisterConfig>,
}

/// Configuration for an operator-facing control slider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Display name.
    pub display_name: String,
    /// Control channel identifier, e.g. "burner".
    pub channel_id: String,
    /// Command template with a `{}` placeholder for the scaled value.
    #[serde(default)]
    pub command_template: String,
    /// Minimum native value.
    #[serde(default)]
    pub min: f64,
    /// Maximum native value.
    #[serde(default = "default_control_max")]
    pub max: f64,
    /// UI step size.
    #[serde(default = "default_control_step")]
    pub step: f64,
    /// Unit label.
    #[serde(default)]
    pub unit: String,
}

fn default_control_max() -> f64 {
    100.0
}
fn default_control_step() -> f64 {
    1.0
}

/// Discriminated connection descriptor. Only the Modbus variant is wired to
/// a working driver (§9 "Modbus is the only required variant"); the others
/// exist so catalog/machine data parses without error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConnectionConfig {
    /// Modbus RTU or TCP.
    #[serde(rename = "modbus_rtu", alias = "modbus_tcp")]
    Modbus(ModbusConnectionConfig),
    /// Plain serial link.
    #[serde(rename = "serial")]
    Serial(SerialConnectionConfig),
    /// Siemens S7.
    #[serde(rename = "s7")]
    S7(S7ConnectionConfig),
}

/// Modbus RTU/TCP connection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModbusConnectionConfig {
    /// TCP host, or serial port path for RTU.
    #[serde(default = "default_modbus_host")]
    pub host: String,
    /// TCP port.
    #[serde(default = "default_modbus_port")]
    pub port: u16,
    /// Serial baud rate (RTU only).
    #[serde(default = "default_baudrate")]
    pub baudrate: u32,
    /// Serial byte size (RTU only).
    #[serde(default = "default_bytesize")]
    pub bytesize: u8,
    /// Serial parity: "N", "E", or "O".
    #[serde(default = "default_parity")]
    pub parity: String,
    /// Serial stop bits.
    #[serde(default = "default_stopbits")]
    pub stopbits: u8,
    /// I/O timeout in seconds.
    #[serde(default = "default_timeout_s")]
    pub timeout: f64,
    /// Float word order: true = low word first.
    #[serde(default = "default_true")]
    pub word_order_little: bool,
}

fn default_modbus_host() -> String {
    "192.168.1.1".to_string()
}
fn default_modbus_port() -> u16 {
    502
}
fn default_baudrate() -> u32 {
    19200
}
fn default_bytesize() -> u8 {
    8
}
fn default_parity() -> String {
    "N".to_string()
}
fn default_stopbits() -> u8 {
    1
}
fn default_timeout_s() -> f64 {
    1.0
}
fn default_true() -> bool {
    true
}

/// Serial connection parameters (no driver implements this protocol).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConnectionConfig {
    /// Serial device path.
    #[serde(default = "default_comport")]
    pub comport: String,
    /// Baud rate.
    #[serde(default = "default_serial_baudrate")]
    pub baudrate: u32,
    /// Byte size.
    #[serde(default = "default_bytesize")]
    pub bytesize: u8,
    /// Parity.
    #[serde(default = "default_parity")]
    pub parity: String,
    /// Stop bits.
    #[serde(default = "default_stopbits")]
    pub stopbits: u8,
    /// I/O timeout in seconds.
    #[serde(default = "default_timeout_s")]
    pub timeout: f64,
}

fn default_comport() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_serial_baudrate() -> u32 {
    115_200
}

/// Siemens S7 connection parameters (no driver implements this protocol).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S7ConnectionConfig {
    /// TCP host.
    #[serde(default = "default_modbus_host")]
    pub host: String,
    /// TCP port.
    #[serde(default = "default_s7_port")]
    pub port: u16,
    /// PLC rack number.
    #[serde(default)]
    pub rack: u16,
    /// PLC slot number.
    #[serde(default)]
    pub slot: u16,
}

fn default_s7_port() -> u16 {
    102
}

/// A single roasting machine definition in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogModel {
    /// Unique model identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Communication protocol.
    pub protocol: ProtocolType,
    /// Default sampling interval in milliseconds.
    #[serde(default = "default_sampling_interval_ms")]
    pub sampling_interval_ms: u32,
    /// Connection descriptor.
    pub connection: ConnectionConfig,
    /// ET channel configuration.
    #[serde(default)]
    pub et: Option<ChannelConfig>,
    /// BT channel configuration.
    #[serde(default)]
    pub bt: Option<ChannelConfig>,
    /// Auxiliary channels beyond ET/BT.
    #[serde(default)]
    pub extra_channels: Vec<ChannelConfig>,
    /// Control sliders exposed by this machine.
    #[serde(default)]
    pub controls: Vec<ControlConfig>,
}

fn default_sampling_interval_ms() -> u32 {
    3000
}

/// A roaster manufacturer and its catalog models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogManufacturer {
    /// URL-safe manufacturer identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// ISO country code.
    #[serde(default)]
    pub country: String,
    /// Models offered by this manufacturer.
    #[serde(default)]
    pub models: Vec<CatalogModel>,
}

/// The complete machine catalog. Loading this from disk is out of scope;
/// this type exists so callers have somewhere to parse catalog data into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineCatalog {
    /// Catalog schema version.
    #[serde(default = "default_catalog_version")]
    pub version: u32,
    /// Manufacturers in the catalog.
    #[serde(default)]
    pub manufacturers: Vec<CatalogManufacturer>,
}

fn default_catalog_version() -> u32 {
    1
}
