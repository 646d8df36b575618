//! Typed process values, as handed to tag consumers

use crate::codec::width;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Access type of a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Bit,
    Byte,
    Word,
    DWord,
    Int,
    Real,
}

impl DataType {
    /// Bytes covered by one value of this type
    pub const fn width(self) -> u32 {
        match self {
            DataType::Bit => width::BIT,
            DataType::Byte => width::BYTE,
            DataType::Word => width::WORD,
            DataType::DWord => width::DWORD,
            DataType::Int => width::INT,
            DataType::Real => width::REAL,
        }
    }
}

impl FromStr for DataType {
    type Err = errors::DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bit" | "bool" => Ok(DataType::Bit),
            "byte" | "u8" => Ok(DataType::Byte),
            "word" | "u16" => Ok(DataType::Word),
            "dword" | "u32" => Ok(DataType::DWord),
            "int" | "i32" => Ok(DataType::Int),
            "real" | "f32" | "float" => Ok(DataType::Real),
            other => Err(errors::DriverError::config(format!(
                "unknown data type: {other}"
            ))),
        }
    }
}

/// One value read from or written to the process image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Bit(bool),
    Byte(u8),
    Word(u16),
    DWord(u32),
    Int(i32),
    Real(f32),
}

impl Value {
    pub const fn data_type(&self) -> DataType {
        match self {
            Value::Bit(_) => DataType::Bit,
            Value::Byte(_) => DataType::Byte,
            Value::Word(_) => DataType::Word,
            Value::DWord(_) => DataType::DWord,
            Value::Int(_) => DataType::Int,
            Value::Real(_) => DataType::Real,
        }
    }

    /// Parse `text` as a value of `data_type`
    pub fn parse(data_type: DataType, text: &str) -> errors::DriverResult<Self> {
        let bad = |e: &dyn fmt::Display| {
            errors::DriverError::config(format!("invalid {data_type:?} value '{text}': {e}"))
        };
        let text = text.trim();
        Ok(match data_type {
            DataType::Bit => match text {
                "1" | "true" | "on" => Value::Bit(true),
                "0" | "false" | "off" => Value::Bit(false),
                _ => return Err(bad(&"expected 0/1/true/false")),
            },
            DataType::Byte => Value::Byte(parse_unsigned(text).map_err(|e| bad(&e))?),
            DataType::Word => Value::Word(parse_unsigned(text).map_err(|e| bad(&e))?),
            DataType::DWord => Value::DWord(parse_unsigned(text).map_err(|e| bad(&e))?),
            DataType::Int => Value::Int(text.parse().map_err(|e| bad(&e))?),
            DataType::Real => Value::Real(text.parse().map_err(|e| bad(&e))?),
        })
    }
}

/// Decimal or `0x`-prefixed hex
fn parse_unsigned<T>(text: &str) -> Result<T, String>
where
    T: TryFrom<u64>,
{
    let raw = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).map_err(|e| e.to_string())?,
        None => text.parse::<u64>().map_err(|e| e.to_string())?,
    };
    T::try_from(raw).map_err(|_| format!("{raw} does not fit"))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bit(v) => write!(f, "{}", u8::from(*v)),
            Value::Byte(v) => write!(f, "{v} (0x{v:02X})"),
            Value::Word(v) => write!(f, "{v} (0x{v:04X})"),
            Value::DWord(v) => write!(f, "{v} (0x{v:08X})"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
        }
    }
}
