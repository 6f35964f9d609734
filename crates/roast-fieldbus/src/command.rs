//! Command template parser for operator control writes.
//!
//! A control's command template is a string with a `{}` placeholder for the
//! scaled value, e.g. `"writeSingle(1,12290,{});mwrite(1,12318,65531,4)"`.
//! Compound commands are separated by `;`; each single command is either
//! `writeSingle(device_id, address, value)` (optionally bracketed,
//! `writeSingle([device_id, address, value])`) or
//! `mwrite(device_id, address, or_mask, and_mask)`.

use roast_common::{RoastError, RoastResult};

/// A single parsed command ready to execute against a Modbus device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Write a single register: `writeSingle(device_id, address, value)`.
    WriteSingle {
        /// Unit/slave ID.
        device_id: u8,
        /// Register address.
        address: u16,
        /// Value to write.
        value: u16,
    },
    /// Masked write: `mwrite(device_id, address, or_mask, and_mask)`.
    MaskWrite {
        /// Unit/slave ID.
        device_id: u8,
        /// Register address.
        address: u16,
        /// Bits to set (ORed in).
        or_mask: u16,
        /// Bits to keep (ANDed in).
        and_mask: u16,
    },
}

/// Substitute `{}` with `value` and parse the resulting `;`-separated
/// compound command string into individual [`Command`]s.
///
/// # Errors
///
/// Returns [`RoastError::ConfigFault`] if any segment cannot be parsed.
pub fn parse_template(template: &str, value: i64) -> RoastResult<Vec<Command>> {
    let resolved = template.replace("{}", &value.to_string());
    resolved
        .split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(parse_single)
        .collect()
}

/// Extract the `(device_id, address)` pair the first command in `template`
/// writes to, without substituting the `{}` placeholder.
///
/// Used by the simulator to learn which register address a control's writes
/// land on, so the thermal engine can pick the write back up.
#[must_use]
pub fn first_command_address(template: &str) -> Option<(u8, u16)> {
    let first_segment = template.split(';').map(str::trim).find(|s| !s.is_empty())?;
    let open = first_segment.find('(')?;
    if !first_segment.ends_with(')') {
        return None;
    }
    let mut args_str = first_segment[open + 1..first_segment.len() - 1].trim();
    if args_str.starts_with('[') && args_str.ends_with(']') {
        args_str = &args_str[1..args_str.len() - 1];
    }
    let mut parts = args_str.split(',').map(str::trim);
    let device_id: u8 = parts.next()?.parse().ok()?;
    let address: u16 = parts.next()?.parse().ok()?;
    Some((device_id, address))
}

fn parse_single(cmd: &str) -> RoastResult<Command> {
    let open = cmd.find('(').ok_or_else(|| {
        RoastError::ConfigFault(format!("cannot parse command: {cmd}"))
    })?;
    if !cmd.ends_with(')') {
        return Err(RoastError::ConfigFault(format!("cannot parse command: {cmd}")));
    }
    let func_name = cmd[..open].trim();
    let mut args_str = cmd[open + 1..cmd.len() - 1].trim();
    if args_str.starts_with('[') && args_str.ends_with(']') {
        args_str = &args_str[1..args_str.len() - 1];
    }

    let args: Vec<i64> = args_str
        .split(',')
        .map(|a| {
            a.trim()
                .parse::<i64>()
                .map_err(|_| RoastError::ConfigFault(format!("invalid integer argument in: {cmd}")))
        })
        .collect::<RoastResult<_>>()?;

    match func_name {
        "writeSingle" => {
            if args.len() != 3 {
                return Err(RoastError::ConfigFault(format!(
                    "writeSingle expects 3 args, got {}: {cmd}",
                    args.len()
                )));
            }
            Ok(Command::WriteSingle {
                device_id: args[0] as u8,
                address: args[1] as u16,
                value: args[2] as u16,
            })
        }
        "mwrite" => {
            if args.len() != 4 {
                return Err(RoastError::ConfigFault(format!(
                    "mwrite expects 4 args, got {}: {cmd}",
                    args.len()
                )));
            }
            Ok(Command::MaskWrite {
                device_id: args[0] as u8,
                address: args[1] as u16,
                or_mask: args[2] as u16,
                and_mask: args[3] as u16,
            })
        }
        other => Err(RoastError::ConfigFault(format!("unknown command function: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_write_single() {
        let cmds = parse_template("writeSingle(1,12290,{})", 75).unwrap();
        assert_eq!(
            cmds,
            vec![Command::WriteSingle {
                device_id: 1,
                address: 12290,
                value: 75
            }]
        );
    }

    #[test]
    fn parses_compound_command() {
        let cmds = parse_template("writeSingle(1,12290,{});mwrite(1,12318,65531,4)", 50).unwrap();
        assert_eq!(
            cmds,
            vec![
                Command::WriteSingle {
                    device_id: 1,
                    address: 12290,
                    value: 50
                },
                Command::MaskWrite {
                    device_id: 1,
                    address: 12318,
                    or_mask: 65531,
                    and_mask: 4
                },
            ]
        );
    }

    #[test]
    fn parses_bracketed_args() {
        let cmds = parse_template("writeSingle([1, 12290, {}])", 10).unwrap();
        assert_eq!(
            cmds,
            vec![Command::WriteSingle {
                device_id: 1,
                address: 12290,
                value: 10
            }]
        );
    }

    #[test]
    fn unknown_function_is_rejected() {
        let err = parse_template("explode(1,2,3)", 0).unwrap_err();
        assert!(matches!(err, RoastError::ConfigFault(_)));
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let err = parse_template("writeSingle(1,2)", 0).unwrap_err();
        assert!(matches!(err, RoastError::ConfigFault(_)));
    }

    #[test]
    fn first_command_address_extracts_device_and_register() {
        assert_eq!(
            first_command_address("writeSingle(1,12290,{})"),
            Some((1, 12290))
        );
        assert_eq!(
            first_command_address("writeSingle([1, 12290, {}])"),
            Some((1, 12290))
        );
        assert_eq!(
            first_command_address("writeSingle(1,12290,{});mwrite(1,12318,65531,4)"),
            Some((1, 12290))
        );
    }

    #[test]
    fn first_command_address_rejects_malformed_template() {
        assert_eq!(first_command_address("not a command"), None);
        assert_eq!(first_command_address(""), None);
    }
}
