//! Driver layer for the roast gateway.
//!
//! This crate provides:
//! - [`codec`] — register decode/encode (divisors, BCD, float word order)
//! - [`command`] — the control command template parser
//! - [`mbap`] — Modbus TCP Application Protocol framing
//! - [`driver`] — the [`driver::RoasterDriver`] trait all drivers implement
//! - [`modbus`] — the async Modbus TCP driver
//! - [`factory`] — builds the right driver for a machine's protocol

pub mod codec;
pub mod command;
pub mod driver;
pub mod factory;
pub mod mbap;
pub mod modbus;

pub use driver::{ConnectionState, DriverInfo, RoasterDriver, TemperatureReading};
pub use factory::create_driver;
