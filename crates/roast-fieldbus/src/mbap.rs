//! Modbus TCP Application Protocol (MBAP) framing.

use roast_common::{RoastError, RoastResult};

/// Modbus function codes used by this driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FunctionCode {
    /// Read Holding Registers (0x03).
    ReadHoldingRegisters = 0x03,
    /// Read Input Registers (0x04).
    ReadInputRegisters = 0x04,
    /// Write Single Register (0x06).
    WriteSingleRegister = 0x06,
    /// Write Multiple Registers (0x10).
    WriteMultipleRegisters = 0x10,
    /// Mask Write Register (0x16).
    MaskWriteRegister = 0x16,
}

/// Modbus exception codes, returned in the low byte of an exception
/// response's PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    /// Illegal function code.
    IllegalFunction = 0x01,
    /// Illegal data address.
    IllegalDataAddress = 0x02,
    /// Illegal data value.
    IllegalDataValue = 0x03,
    /// Server device failure.
    ServerDeviceFailure = 0x04,
}

impl ExceptionCode {
    /// Parse an exception code from a byte value.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::IllegalFunction),
            0x02 => Some(Self::IllegalDataAddress),
            0x03 => Some(Self::IllegalDataValue),
            0x04 => Some(Self::ServerDeviceFailure),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IllegalFunction => write!(f, "illegal function"),
            Self::IllegalDataAddress => write!(f, "illegal data address"),
            Self::IllegalDataValue => write!(f, "illegal data value"),
            Self::ServerDeviceFailure => write!(f, "server device failure"),
        }
    }
}

/// Modbus TCP Application Protocol (MBAP) header.
#[derive(Debug, Clone, Copy)]
pub struct MbapHeader {
    /// Transaction identifier (echoed by the server).
    pub transaction_id: u16,
    /// Protocol identifier (0 for Modbus).
    pub protocol_id: u16,
    /// Length of the remaining data (unit ID + PDU), in bytes.
    pub length: u16,
    /// Unit/slave identifier.
    pub unit_id: u8,
}

impl MbapHeader {
    /// MBAP header size in bytes.
    pub const SIZE: usize = 7;

    /// Build a header for a request carrying `pdu_len` bytes of PDU.
    #[must_use]
    pub fn new(transaction_id: u16, pdu_len: u16, unit_id: u8) -> Self {
        Self {
            transaction_id,
            protocol_id: 0,
            length: pdu_len + 1,
            unit_id,
        }
    }

    /// Serialize the header to its 7-byte wire form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..2].copy_from_slice(&self.transaction_id.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.protocol_id.to_be_bytes());
        bytes[4..6].copy_from_slice(&self.length.to_be_bytes());
        bytes[6] = self.unit_id;
        bytes
    }

    /// Parse a header from its 7-byte wire form.
    ///
    /// # Errors
    ///
    /// Returns [`RoastError::InvalidFrame`] if fewer than [`Self::SIZE`]
    /// bytes are given.
    pub fn from_bytes(bytes: &[u8]) -> RoastResult<Self> {
        if bytes.len() < Self::SIZE {
            return Err(RoastError::InvalidFrame(format!(
                "MBAP header too short: {} bytes",
                bytes.len()
            )));
        }
        Ok(Self {
            transaction_id: u16::from_be_bytes([bytes[0], bytes[1]]),
            protocol_id: u16::from_be_bytes([bytes[2], bytes[3]]),
            length: u16::from_be_bytes([bytes[4], bytes[5]]),
            unit_id: bytes[6],
        })
    }
}

/// Build the PDU for "read holding/input registers": function code, address,
/// and quantity.
#[must_use]
pub fn build_read_pdu(function: FunctionCode, address: u16, quantity: u16) -> Vec<u8> {
    let mut pdu = Vec::with_capacity(5);
    pdu.push(function as u8);
    pdu.extend_from_slice(&address.to_be_bytes());
    pdu.extend_from_slice(&quantity.to_be_bytes());
    pdu
}

/// Build the PDU for "write single register".
#[must_use]
pub fn build_write_single_pdu(address: u16, value: u16) -> Vec<u8> {
    let mut pdu = Vec::with_capacity(5);
    pdu.push(FunctionCode::WriteSingleRegister as u8);
    pdu.extend_from_slice(&address.to_be_bytes());
    pdu.extend_from_slice(&value.to_be_bytes());
    pdu
}

/// Build the PDU for "mask write register".
#[must_use]
pub fn build_mask_write_pdu(address: u16, and_mask: u16, or_mask: u16) -> Vec<u8> {
    let mut pdu = Vec::with_capacity(7);
    pdu.push(FunctionCode::MaskWriteRegister as u8);
    pdu.extend_from_slice(&address.to_be_bytes());
    pdu.extend_from_slice(&and_mask.to_be_bytes());
    pdu.extend_from_slice(&or_mask.to_be_bytes());
    pdu
}

/// Parse the register values out of a "read registers" response PDU,
/// checking the function code and reported byte count.
///
/// # Errors
///
/// Returns [`RoastError::InvalidFrame`] if the PDU is an exception response
/// or malformed, or [`RoastError::TransientIo`] if the device returned a
/// Modbus exception.
pub fn parse_read_response(pdu: &[u8], expected_function: FunctionCode) -> RoastResult<Vec<u16>> {
    if pdu.is_empty() {
        return Err(RoastError::InvalidFrame("empty response PDU".to_string()));
    }

    let function_byte = pdu[0];
    if function_byte & 0x80 != 0 {
        let code = pdu.get(1).copied().unwrap_or(0);
        let exception = ExceptionCode::from_byte(code)
            .map(|e| e.to_string())
            .unwrap_or_else(|| format!("unknown exception code {code}"));
        return Err(RoastError::TransientIo(format!(
            "device returned Modbus exception: {exception}"
        )));
    }

    if function_byte != expected_function as u8 {
        return Err(RoastError::InvalidFrame(format!(
            "unexpected function code {function_byte:#04x}"
        )));
    }

    let byte_count = *pdu
        .get(1)
        .ok_or_else(|| RoastError::InvalidFrame("response PDU missing byte count".to_string()))?
        as usize;
    let register_bytes = pdu
        .get(2..2 + byte_count)
        .ok_or_else(|| RoastError::InvalidFrame("response PDU shorter than byte count".to_string()))?;

    Ok(register_bytes
        .chunks_exact(2)
        .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = MbapHeader::new(42, 5, 1);
        let bytes = header.to_bytes();
        let parsed = MbapHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.transaction_id, 42);
        assert_eq!(parsed.length, 6);
        assert_eq!(parsed.unit_id, 1);
    }

    #[test]
    fn read_response_extracts_registers() {
        let pdu = [0x03, 0x04, 0x00, 0xC8, 0x01, 0x2C];
        let regs = parse_read_response(&pdu, FunctionCode::ReadHoldingRegisters).unwrap();
        assert_eq!(regs, vec![200, 300]);
    }

    #[test]
    fn exception_response_is_transient_io() {
        let pdu = [0x83, 0x02];
        let err = parse_read_response(&pdu, FunctionCode::ReadHoldingRegisters).unwrap_err();
        assert!(matches!(err, RoastError::TransientIo(_)));
    }
}
