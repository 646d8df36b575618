//! Mailbox command set and payload codec
//!
//! Every request is a command id plus up to [`MAX_VALUES`] `i32` payload
//! values. Addresses travel as `[area, byte, bit]`; value writes append the
//! value as one more int, with DWORD and REAL carried as their raw 32-bit
//! pattern.

use errors::{DriverResult, ProtocolError};
use procdata::{codec, Address, Area};
use std::fmt;

/// Payload capacity of the mailbox
pub const MAX_VALUES: usize = 100;

/// Ints per encoded address
pub const ADDRESS_INTS: usize = 3;

/// Most addresses one SET_BITS request can carry
pub const MAX_SET_BITS: usize = MAX_VALUES / ADDRESS_INTS;

/// Command ids as stored in the mailbox
pub mod id {
    pub const EXIT: i32 = 1;
    pub const PING: i32 = 2;
    pub const SET_BIT: i32 = 3;
    pub const RESET_BIT: i32 = 4;
    pub const INVERT_BIT: i32 = 5;
    pub const SET_BITS: i32 = 6;
    pub const WRITE_BYTE: i32 = 7;
    pub const WRITE_WORD: i32 = 8;
    pub const WRITE_DWORD: i32 = 9;
    pub const WRITE_INT: i32 = 10;
    pub const WRITE_REAL: i32 = 11;
}

/// Reply codes
pub mod reply {
    pub const OK: i32 = 0;
    pub const FAILED: i32 = -1;
    pub const PONG: i32 = 1;
}

/// Human-readable command name for logs
pub fn command_name(command: i32) -> &'static str {
    match command {
        id::EXIT => "EXIT",
        id::PING => "PING",
        id::SET_BIT => "SET_BIT",
        id::RESET_BIT => "RESET_BIT",
        id::INVERT_BIT => "INVERT_BIT",
        id::SET_BITS => "SET_BITS",
        id::WRITE_BYTE => "WRITE_BYTE",
        id::WRITE_WORD => "WRITE_WORD",
        id::WRITE_DWORD => "WRITE_DWORD",
        id::WRITE_INT => "WRITE_INT",
        id::WRITE_REAL => "WRITE_REAL",
        _ => "UNKNOWN",
    }
}

/// One decoded mailbox request
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Exit,
    Ping,
    SetBit(Address),
    ResetBit(Address),
    InvertBit(Address),
    SetBits(Vec<Address>),
    WriteByte(Address, u8),
    WriteWord(Address, u16),
    WriteDWord(Address, u32),
    WriteInt(Address, i32),
    WriteReal(Address, f32),
}

impl Command {
    pub fn id(&self) -> i32 {
        match self {
            Command::Exit => id::EXIT,
            Command::Ping => id::PING,
            Command::SetBit(_) => id::SET_BIT,
            Command::ResetBit(_) => id::RESET_BIT,
            Command::InvertBit(_) => id::INVERT_BIT,
            Command::SetBits(_) => id::SET_BITS,
            Command::WriteByte(..) => id::WRITE_BYTE,
            Command::WriteWord(..) => id::WRITE_WORD,
            Command::WriteDWord(..) => id::WRITE_DWORD,
            Command::WriteInt(..) => id::WRITE_INT,
            Command::WriteReal(..) => id::WRITE_REAL,
        }
    }

    /// Reply code a successful execution answers with
    pub fn success_code(&self) -> i32 {
        match self {
            Command::Ping => reply::PONG,
            _ => reply::OK,
        }
    }

    /// Encode the payload values
    pub fn encode(&self) -> DriverResult<Vec<i32>> {
        let values = match self {
            Command::Exit | Command::Ping => Vec::new(),
            Command::SetBit(addr) | Command::ResetBit(addr) | Command::InvertBit(addr) => {
                encode_address(addr).to_vec()
            },
            Command::SetBits(addrs) => {
                if addrs.is_empty() {
                    return Err(ProtocolError::LengthMismatch {
                        command: id::SET_BITS,
                        expected: "at least one address".to_string(),
                        actual: 0,
                    }
                    .into());
                }
                let len = addrs.len() * ADDRESS_INTS;
                if len > MAX_VALUES {
                    return Err(ProtocolError::PayloadTooLarge {
                        len,
                        capacity: MAX_VALUES,
                    }
                    .into());
                }
                addrs.iter().flat_map(encode_address).collect()
            },
            Command::WriteByte(addr, v) => with_value(addr, i32::from(*v)),
            Command::WriteWord(addr, v) => with_value(addr, i32::from(*v)),
            Command::WriteDWord(addr, v) => with_value(addr, *v as i32),
            Command::WriteInt(addr, v) => with_value(addr, *v),
            Command::WriteReal(addr, v) => with_value(addr, codec::real_to_bits(*v) as i32),
        };
        Ok(values)
    }

    /// Decode a request. Checks the payload length against the command's
    /// arity and every area code; range checks are left to the store.
    pub fn decode(command: i32, values: &[i32]) -> DriverResult<Self> {
        let len = values.len();
        match command {
            id::EXIT => {
                expect_len(command, values, 0)?;
                Ok(Command::Exit)
            },
            id::PING => {
                expect_len(command, values, 0)?;
                Ok(Command::Ping)
            },
            id::SET_BIT | id::RESET_BIT | id::INVERT_BIT => {
                expect_len(command, values, ADDRESS_INTS)?;
                let addr = decode_address(values)?;
                Ok(match command {
                    id::SET_BIT => Command::SetBit(addr),
                    id::RESET_BIT => Command::ResetBit(addr),
                    _ => Command::InvertBit(addr),
                })
            },
            id::SET_BITS => {
                if len == 0 || len % ADDRESS_INTS != 0 || len > MAX_SET_BITS * ADDRESS_INTS {
                    return Err(ProtocolError::LengthMismatch {
                        command,
                        expected: format!(
                            "multiple of {ADDRESS_INTS} in {ADDRESS_INTS}..={}",
                            MAX_SET_BITS * ADDRESS_INTS
                        ),
                        actual: len as i32,
                    }
                    .into());
                }
                let addrs = values
                    .chunks_exact(ADDRESS_INTS)
                    .map(decode_address)
                    .collect::<DriverResult<Vec<_>>>()?;
                Ok(Command::SetBits(addrs))
            },
            id::WRITE_BYTE | id::WRITE_WORD | id::WRITE_DWORD | id::WRITE_INT | id::WRITE_REAL => {
                expect_len(command, values, ADDRESS_INTS + 1)?;
                let addr = decode_address(&values[..ADDRESS_INTS])?;
                let raw = values[ADDRESS_INTS];
                Ok(match command {
                    id::WRITE_BYTE => Command::WriteByte(addr, narrow(command, raw)?),
                    id::WRITE_WORD => Command::WriteWord(addr, narrow(command, raw)?),
                    id::WRITE_DWORD => Command::WriteDWord(addr, raw as u32),
                    id::WRITE_INT => Command::WriteInt(addr, raw),
                    _ => Command::WriteReal(addr, codec::real_from_bits(raw as u32)),
                })
            },
            other => Err(ProtocolError::UnknownCommand(other).into()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = command_name(self.id());
        match self {
            Command::Exit | Command::Ping => f.write_str(name),
            Command::SetBit(addr) | Command::ResetBit(addr) | Command::InvertBit(addr) => {
                write!(f, "{name} {addr}")
            },
            Command::SetBits(addrs) => write!(f, "{name} x{}", addrs.len()),
            Command::WriteByte(addr, v) => write!(f, "{name} {addr} = {v}"),
            Command::WriteWord(addr, v) => write!(f, "{name} {addr} = {v}"),
            Command::WriteDWord(addr, v) => write!(f, "{name} {addr} = {v}"),
            Command::WriteInt(addr, v) => write!(f, "{name} {addr} = {v}"),
            Command::WriteReal(addr, v) => write!(f, "{name} {addr} = {v}"),
        }
    }
}

fn encode_address(addr: &Address) -> [i32; ADDRESS_INTS] {
    [addr.area.code(), addr.byte as i32, addr.bit as i32]
}

fn with_value(addr: &Address, value: i32) -> Vec<i32> {
    let [area, byte, bit] = encode_address(addr);
    vec![area, byte, bit, value]
}

// Negative offsets map to u32 values far past any area, so the store
// rejects them with the usual range errors.
fn decode_address(values: &[i32]) -> DriverResult<Address> {
    let area = Area::from_code(values[0])?;
    Ok(Address::new(area, values[1] as u32, values[2] as u32))
}

fn expect_len(command: i32, values: &[i32], expected: usize) -> DriverResult<()> {
    if values.len() != expected {
        return Err(ProtocolError::LengthMismatch {
            command,
            expected: expected.to_string(),
            actual: values.len() as i32,
        }
        .into());
    }
    Ok(())
}

fn narrow<T: TryFrom<i32>>(command: i32, raw: i32) -> DriverResult<T> {
    T::try_from(raw).map_err(|_| {
        ProtocolError::MalformedFrame(format!(
            "{} value {raw} out of range",
            command_name(command)
        ))
        .into()
    })
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use errors::DriverError;

    #[test]
    fn test_bit_payload_layout() {
        let cmd = Command::SetBit(Address::new(Area::Memory, 5, 3));
        assert_eq!(cmd.id(), 3);
        assert_eq!(cmd.encode().unwrap(), vec![2, 5, 3]);
    }

    #[test]
    fn test_real_travels_as_bit_pattern() {
        let cmd = Command::WriteReal(Address::byte(Area::Output, 8), 1.0);
        assert_eq!(cmd.encode().unwrap(), vec![1, 8, 0, 0x3F80_0000]);
        let back = Command::decode(id::WRITE_REAL, &[1, 8, 0, 0x3F80_0000]).unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn test_dword_high_bit_survives() {
        let cmd = Command::WriteDWord(Address::byte(Area::Input, 0), 0xFFFF_FFFE);
        let values = cmd.encode().unwrap();
        assert_eq!(values[3], -2);
        assert_eq!(Command::decode(id::WRITE_DWORD, &values).unwrap(), cmd);
    }

    #[test]
    fn test_set_bits_capacity() {
        let addrs: Vec<_> = (0..MAX_SET_BITS as u32)
            .map(|i| Address::new(Area::Output, i, 0))
            .collect();
        assert_eq!(Command::SetBits(addrs.clone()).encode().unwrap().len(), 99);

        let mut too_many = addrs;
        too_many.push(Address::new(Area::Output, 0, 1));
        assert!(matches!(
            Command::SetBits(too_many).encode(),
            Err(DriverError::Protocol(ProtocolError::PayloadTooLarge { len: 102, capacity: 100 }))
        ));
        assert!(Command::SetBits(Vec::new()).encode().is_err());
    }

    #[test]
    fn test_decode_length_mismatch() {
        for (command, values) in [
            (id::PING, vec![1]),
            (id::SET_BIT, vec![0, 1]),
            (id::WRITE_WORD, vec![0, 1, 0]),
            (id::SET_BITS, vec![0, 1, 0, 1]),
            (id::SET_BITS, vec![]),
        ] {
            let err = Command::decode(command, &values).unwrap_err();
            assert_eq!(err.error_code(), "LENGTH_MISMATCH", "command {command}");
        }
    }

    #[test]
    fn test_decode_unknown_area_and_command() {
        assert_eq!(
            Command::decode(id::SET_BIT, &[7, 0, 0]).unwrap_err(),
            DriverError::Protocol(ProtocolError::UnknownArea(7))
        );
        assert_eq!(
            Command::decode(42, &[]).unwrap_err(),
            DriverError::Protocol(ProtocolError::UnknownCommand(42))
        );
    }

    #[test]
    fn test_decode_narrow_values() {
        assert!(Command::decode(id::WRITE_BYTE, &[0, 0, 0, 256]).is_err());
        assert!(Command::decode(id::WRITE_WORD, &[0, 0, 0, -1]).is_err());
        assert_eq!(
            Command::decode(id::WRITE_WORD, &[0, 0, 0, 65535]).unwrap(),
            Command::WriteWord(Address::byte(Area::Input, 0), 0xFFFF)
        );
    }

    #[test]
    fn test_success_codes() {
        assert_eq!(Command::Ping.success_code(), reply::PONG);
        assert_eq!(Command::Exit.success_code(), reply::OK);
    }
}
