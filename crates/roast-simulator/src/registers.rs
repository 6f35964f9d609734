//! In-memory Modbus register store backing the simulator's server.
//!
//! Replaces a general-purpose Modbus server context: the simulator only
//! ever needs per-device holding/input register words keyed by address,
//! with channel configs telling it how to encode/decode a value.

use roast_common::{ChannelConfig, ModbusRegisterConfig, RoastError, RoastResult};
use std::collections::HashMap;

/// Holds holding (FC3) and input (FC4) register words for every device unit
/// the simulator answers for.
#[derive(Debug, Default)]
pub struct RegisterMap {
    holding: HashMap<(u8, u16), u16>,
    input: HashMap<(u8, u16), u16>,
}

impl RegisterMap {
    /// Create an empty register map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn store_for(&mut self, function_code: u8) -> Option<&mut HashMap<(u8, u16), u16>> {
        match function_code {
            3 => Some(&mut self.holding),
            4 => Some(&mut self.input),
            _ => None,
        }
    }

    fn store_for_ref(&self, function_code: u8) -> Option<&HashMap<(u8, u16), u16>> {
        match function_code {
            3 => Some(&self.holding),
            4 => Some(&self.input),
            _ => None,
        }
    }

    /// Encode `value` per `config` and write the resulting word(s) into the
    /// register space `config` names.
    pub fn write_channel(&mut self, config: &ModbusRegisterConfig, value: f64, word_order_little: bool) {
        let words = roast_fieldbus::codec::encode_value(value, config, word_order_little);
        let Some(store) = self.store_for(config.function_code) else {
            return;
        };
        for (offset, word) in words.into_iter().enumerate() {
            store.insert((config.device_id, config.address + offset as u16), word);
        }
    }

    /// Convenience wrapper over [`RegisterMap::write_channel`] for a full
    /// channel config; a no-op if the channel has no Modbus backing.
    pub fn write_modbus_channel(&mut self, channel: &ChannelConfig, value: f64, word_order_little: bool) {
        if let Some(config) = &channel.modbus {
            self.write_channel(config, value, word_order_little);
        }
    }

    /// Write a raw register word directly, as a control command would via
    /// `writeSingle`.
    pub fn write_raw(&mut self, function_code: u8, device_id: u8, address: u16, word: u16) {
        if let Some(store) = self.store_for(function_code) {
            store.insert((device_id, address), word);
        }
    }

    /// Apply a mask-write (function code 22): `result = (current & and_mask) | (or_mask & !and_mask)`.
    pub fn mask_write(&mut self, device_id: u8, address: u16, and_mask: u16, or_mask: u16) {
        let current = *self.holding.get(&(device_id, address)).unwrap_or(&0);
        let result = (current & and_mask) | (or_mask & !and_mask);
        self.holding.insert((device_id, address), result);
    }

    /// Read `count` consecutive register words starting at `address` for
    /// `device_id`, missing entries default to 0.
    ///
    /// # Errors
    ///
    /// Returns [`RoastError::InvalidFrame`] if `function_code` is neither 3
    /// nor 4.
    pub fn read_raw(&self, function_code: u8, device_id: u8, address: u16, count: u16) -> RoastResult<Vec<u16>> {
        let store = self
            .store_for_ref(function_code)
            .ok_or_else(|| RoastError::InvalidFrame(format!("unsupported function code {function_code}")))?;
        Ok((0..count)
            .map(|i| *store.get(&(device_id, address + i)).unwrap_or(&0))
            .collect())
    }

    /// Decode the current value of a channel's register(s), or `0.0` if the
    /// channel has no Modbus backing.
    #[must_use]
    pub fn read_channel(&self, config: &ModbusRegisterConfig, word_order_little: bool) -> f64 {
        let count = if config.is_float { 2 } else { 1 };
        let registers = self
            .read_raw(config.function_code, config.device_id, config.address, count)
            .unwrap_or_default();
        if registers.len() < count as usize {
            return 0.0;
        }
        roast_fieldbus::codec::decode_value(config, &registers, word_order_little)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(function_code: u8, address: u16) -> ModbusRegisterConfig {
        ModbusRegisterConfig {
            address,
            function_code,
            device_id: 1,
            divisor: 1,
            mode: "C".to_string(),
            is_float: false,
            is_bcd: false,
        }
    }

    #[test]
    fn write_then_read_channel_round_trips() {
        let mut map = RegisterMap::new();
        let cfg = config(4, 100);
        map.write_channel(&cfg, 21.5, true);
        let value = map.read_channel(&cfg, true);
        assert!((value - 21.5).abs() < 0.01);
    }

    #[test]
    fn missing_register_reads_as_zero() {
        let map = RegisterMap::new();
        let cfg = config(3, 5);
        assert_eq!(map.read_channel(&cfg, true), 0.0);
    }

    #[test]
    fn mask_write_combines_with_existing_value() {
        let mut map = RegisterMap::new();
        map.write_raw(3, 1, 10, 0b1010);
        map.mask_write(1, 10, 0b0011, 0b0100);
        let result = map.read_raw(3, 1, 10, 1).unwrap()[0];
        assert_eq!(result, 0b0110);
    }

    #[test]
    fn unsupported_function_code_errors() {
        let map = RegisterMap::new();
        let err = map.read_raw(16, 1, 0, 1).unwrap_err();
        assert!(matches!(err, RoastError::InvalidFrame(_)));
    }
}
