//! Driver factory: builds the correct [`RoasterDriver`] for a saved
//! machine's protocol.

use crate::driver::RoasterDriver;
use crate::modbus::ModbusDriver;
use roast_common::{ProtocolType, RoastError, RoastResult, SavedMachine};
use std::time::Duration;

/// Construct the appropriate driver for `machine`.
///
/// # Errors
///
/// Returns [`RoastError::ConfigFault`] if `machine`'s protocol has no
/// implemented driver (Modbus is the only protocol with one today).
pub fn create_driver(machine: SavedMachine, timeout: Duration) -> RoastResult<Box<dyn RoasterDriver>> {
    match machine.protocol {
        ProtocolType::ModbusRtu | ProtocolType::ModbusTcp => {
            Ok(Box::new(ModbusDriver::new(machine, timeout)?))
        }
        ProtocolType::S7 => Err(RoastError::ConfigFault("S7 driver not yet implemented".to_string())),
        ProtocolType::Serial => Err(RoastError::ConfigFault("serial driver not yet implemented".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roast_common::{ConnectionConfig, SerialConnectionConfig};

    fn serial_machine() -> SavedMachine {
        SavedMachine {
            id: "m1".to_string(),
            name: "Serial Roaster".to_string(),
            catalog_manufacturer_id: None,
            catalog_model_id: None,
            protocol: ProtocolType::Serial,
            connection: ConnectionConfig::Serial(SerialConnectionConfig {
                comport: "/dev/ttyUSB0".to_string(),
                baudrate: 115_200,
                bytesize: 8,
                parity: "N".to_string(),
                stopbits: 1,
                timeout: 1.0,
            }),
            sampling_interval_ms: 3000,
            et: None,
            bt: None,
            extra_channels: Vec::new(),
            controls: Vec::new(),
        }
    }

    #[test]
    fn serial_protocol_is_not_implemented() {
        let err = create_driver(serial_machine(), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, RoastError::ConfigFault(_)));
    }
}
