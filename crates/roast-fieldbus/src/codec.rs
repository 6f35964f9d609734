//! Register decoding/encoding: divisors, BCD, IEEE-754 float word order, and
//! Fahrenheit-to-Celsius conversion.

use roast_common::ModbusRegisterConfig;

/// Divisor lookup: selector index → divide-by value.
fn divisor_value(selector: u8) -> f64 {
    match selector {
        1 => 10.0,
        2 => 100.0,
        3 => 1000.0,
        _ => 1.0,
    }
}

/// Decode a BCD-encoded 16-bit register value to an integer.
///
/// Each nibble is a decimal digit, e.g. `0x0215` decodes to `215`.
#[must_use]
pub fn bcd_to_int(value: u16) -> i32 {
    let mut result: i32 = 0;
    let mut multiplier: i32 = 1;
    let mut v = value;
    while v > 0 {
        let digit = i32::from(v & 0x0F);
        result += digit * multiplier;
        multiplier *= 10;
        v >>= 4;
    }
    result
}

/// Encode a non-negative integer as a BCD 16-bit register value. Negative
/// values clamp to zero, matching the encoder used by the simulator's
/// register map.
#[must_use]
pub fn int_to_bcd(value: i32) -> u16 {
    let mut v = value.max(0);
    let mut result: u16 = 0;
    let mut shift = 0;
    while v > 0 && shift < 16 {
        let digit = (v % 10) as u16;
        result |= digit << shift;
        shift += 4;
        v /= 10;
    }
    result
}

/// Convert Fahrenheit to Celsius.
#[must_use]
pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

/// Convert Celsius to Fahrenheit.
#[must_use]
pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

/// Decode two 16-bit registers into a 32-bit IEEE-754 float.
///
/// `word_order_little` selects whether `registers[0]` is the low word
/// (`true`) or the high word (`false`).
#[must_use]
pub fn decode_float(registers: [u16; 2], word_order_little: bool) -> f32 {
    let (high, low) = if word_order_little {
        (registers[1], registers[0])
    } else {
        (registers[0], registers[1])
    };
    let bytes = [
        (high >> 8) as u8,
        (high & 0xFF) as u8,
        (low >> 8) as u8,
        (low & 0xFF) as u8,
    ];
    f32::from_be_bytes(bytes)
}

/// Encode a 32-bit IEEE-754 float into two 16-bit registers, in the word
/// order selected by `word_order_little`.
#[must_use]
pub fn encode_float(value: f32, word_order_little: bool) -> [u16; 2] {
    let bytes = value.to_be_bytes();
    let high = u16::from_be_bytes([bytes[0], bytes[1]]);
    let low = u16::from_be_bytes([bytes[2], bytes[3]]);
    if word_order_little {
        [low, high]
    } else {
        [high, low]
    }
}

/// Decode raw register words into a value, per the register's codec rules:
/// float decode, BCD decode, or signed 16-bit integer, followed by divisor
/// and temperature-mode conversion.
///
/// `registers` must contain 2 entries when `config.is_float` is set,
/// otherwise only the first entry is read.
#[must_use]
pub fn decode_value(config: &ModbusRegisterConfig, registers: &[u16], word_order_little: bool) -> f64 {
    let mut value = if config.is_float {
        f64::from(decode_float([registers[0], registers[1]], word_order_little))
    } else if config.is_bcd {
        f64::from(bcd_to_int(registers[0]))
    } else {
        let raw = registers[0];
        f64::from(if raw >= 0x8000 {
            i32::from(raw) - 0x1_0000
        } else {
            i32::from(raw)
        })
    };

    let divisor = divisor_value(config.divisor);
    if divisor > 1.0 {
        value /= divisor;
    }

    if config.mode == "F" {
        value = fahrenheit_to_celsius(value);
    }

    value
}

/// Encode a value into the register word(s) a driver reading `config` would
/// decode back to `value`: the inverse of [`decode_value`]. Used by the
/// simulator to seed and update its register map.
///
/// Returns 1 word for signed-int16/BCD encodings, 2 for float32.
#[must_use]
pub fn encode_value(value: f64, config: &ModbusRegisterConfig, word_order_little: bool) -> Vec<u16> {
    let mut value = value;
    if config.mode == "F" {
        value = celsius_to_fahrenheit(value);
    }

    let multiplier = divisor_value(config.divisor);
    if multiplier > 1.0 {
        value *= multiplier;
    }

    if config.is_float {
        let registers = encode_float(value as f32, word_order_little);
        return registers.to_vec();
    }

    if config.is_bcd {
        return vec![int_to_bcd(value.round() as i32)];
    }

    let mut raw = value.round() as i32;
    raw = raw.clamp(-32768, 32767);
    let word = if raw < 0 { (raw + 0x1_0000) as u16 } else { raw as u16 };
    vec![word]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bcd_round_trips_through_int() {
        assert_eq!(bcd_to_int(0x0215), 215);
        assert_eq!(int_to_bcd(215), 0x0215);
        assert_eq!(int_to_bcd(-5), 0);
    }

    #[test]
    fn float_decode_respects_word_order() {
        let value: f32 = 205.5;
        let be = encode_float(value, false);
        assert_eq!(decode_float(be, false), value);

        let le = encode_float(value, true);
        assert_eq!(decode_float(le, true), value);
    }

    #[test]
    fn negative_raw_register_decodes_as_signed() {
        let registers = [0xFFFFu16];
        let config = ModbusRegisterConfig {
            address: 0,
            function_code: 3,
            device_id: 1,
            divisor: 0,
            mode: String::new(),
            is_float: false,
            is_bcd: false,
        };
        assert_eq!(decode_value(&config, &registers, false), -1.0);
    }

    #[test]
    fn fahrenheit_mode_converts_to_celsius() {
        let registers = [720u16]; // raw 72.0 after /10 divisor, Fahrenheit
        let config = ModbusRegisterConfig {
            address: 0,
            function_code: 4,
            device_id: 1,
            divisor: 1,
            mode: "F".to_string(),
            is_float: false,
            is_bcd: false,
        };
        let celsius = decode_value(&config, &registers, false);
        assert!((celsius - 22.222).abs() < 0.01);
    }

    #[test]
    fn encode_then_decode_recovers_original_value() {
        let config = ModbusRegisterConfig {
            address: 0,
            function_code: 3,
            device_id: 1,
            divisor: 1,
            mode: "F".to_string(),
            is_float: true,
            is_bcd: false,
        };
        let original = 92.5;
        let registers = encode_value(original, &config, true);
        let decoded = decode_value(&config, &registers, true);
        assert!((decoded - original).abs() < 0.01);
    }
}
