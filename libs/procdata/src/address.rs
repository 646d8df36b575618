//! Logical I/O point addressing and range validation
//!
//! An [`Address`] names one point of the process image: an area, a byte
//! offset inside that area and a bit offset inside that byte. Addresses are
//! plain values; validation against a concrete backend happens through the
//! `check_*` functions before any data is touched.
//!
//! Textual notation follows the usual PLC style:
//!
//! | Text    | Meaning                          |
//! |---------|----------------------------------|
//! | `I12.3` | input byte 12, bit 3             |
//! | `Q0.7`  | output byte 0, bit 7             |
//! | `M5`    | memory byte 5 (bit 0)            |
//! | `MW10`  | memory byte 10, word-sized point |
//! | `QD4`   | output byte 4, dword-sized point |

use crate::area::Area;
use errors::{AddressError, DriverResult};
use std::fmt;
use std::str::FromStr;

/// Highest valid bit offset inside a byte
pub const MAX_BIT: u32 = 7;

/// One logical I/O point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub area: Area,
    pub byte: u32,
    pub bit: u32,
}

impl Address {
    #[inline]
    pub const fn new(area: Area, byte: u32, bit: u32) -> Self {
        Self { area, byte, bit }
    }

    /// Byte-granular address (bit offset 0)
    #[inline]
    pub const fn byte(area: Area, byte: u32) -> Self {
        Self { area, byte, bit: 0 }
    }

    /// Fails with `BitOutOfRange` if the bit offset is above 7
    #[inline]
    pub fn check_bit(&self) -> DriverResult<()> {
        if self.bit > MAX_BIT {
            return Err(AddressError::BitOutOfRange { bit: self.bit }.into());
        }
        Ok(())
    }

    /// Fails with `AreaOutOfRange` if the area is not in `allowed`
    #[inline]
    pub fn check_area(&self, allowed: &[Area]) -> DriverResult<()> {
        if !allowed.contains(&self.area) {
            return Err(AddressError::AreaOutOfRange {
                area: self.area.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Fails with `ByteOutOfRange` if `byte + width > max_byte`
    #[inline]
    pub fn check_byte(&self, max_byte: u32, width: u32) -> DriverResult<()> {
        if u64::from(self.byte) + u64::from(width) > u64::from(max_byte) {
            return Err(AddressError::ByteOutOfRange {
                byte: self.byte,
                width,
                max: max_byte,
            }
            .into());
        }
        Ok(())
    }

    /// Run all three checks in order: bit, area, byte window
    pub fn validate(&self, allowed: &[Area], max_byte: u32, width: u32) -> DriverResult<()> {
        self.check_bit()?;
        self.check_area(allowed)?;
        self.check_byte(max_byte, width)
    }

    /// Single-bit mask inside the addressed byte
    #[inline]
    pub const fn bit_mask(&self) -> u8 {
        1u8 << (self.bit & MAX_BIT)
    }

    /// Byte offset as a slice index
    #[inline]
    pub const fn offset(&self) -> usize {
        self.byte as usize
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}.{}", self.area.prefix(), self.byte, self.bit)
    }
}

impl FromStr for Address {
    type Err = errors::DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AddressError::InvalidNotation(s.to_string());
        let text = s.trim().to_ascii_uppercase();
        let mut chars = text.chars();

        let area = match chars.next() {
            Some('I') => Area::Input,
            Some('Q') => Area::Output,
            Some('M') => Area::Memory,
            _ => return Err(invalid().into()),
        };

        let mut rest = chars.as_str();
        // Optional size letter: B(yte), W(ord), D(word)
        let sized = match rest.chars().next() {
            Some('B' | 'W' | 'D') => {
                rest = &rest[1..];
                true
            },
            _ => false,
        };

        let (byte_text, bit_text) = match rest.split_once('.') {
            Some((byte, bit)) => (byte, Some(bit)),
            None => (rest, None),
        };

        let byte: u32 = byte_text.parse().map_err(|_| invalid())?;
        let bit: u32 = match bit_text {
            Some(_) if sized => return Err(invalid().into()),
            Some(bit) => bit.parse().map_err(|_| invalid())?,
            None => 0,
        };

        let address = Address::new(area, byte, bit);
        address.check_bit()?;
        Ok(address)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use errors::DriverError;

    #[test]
    fn test_check_bit_boundary() {
        assert!(Address::new(Area::Input, 0, 7).check_bit().is_ok());
        for bit in [8, 9, 31, u32::MAX] {
            let err = Address::new(Area::Input, 0, bit).check_bit().unwrap_err();
            assert_eq!(
                err,
                DriverError::Address(AddressError::BitOutOfRange { bit })
            );
        }
    }

    #[test]
    fn test_check_byte_boundary() {
        let max = 5000;
        for width in [1u32, 2, 4] {
            let last_ok = Address::byte(Area::Output, max - width);
            assert!(last_ok.check_byte(max, width).is_ok());

            let first_bad = Address::byte(Area::Output, max - width + 1);
            assert!(matches!(
                first_bad.check_byte(max, width),
                Err(DriverError::Address(AddressError::ByteOutOfRange { .. }))
            ));
        }
    }

    #[test]
    fn test_check_byte_no_overflow() {
        let addr = Address::byte(Area::Input, u32::MAX);
        assert!(addr.check_byte(u32::MAX, 4).is_err());
    }

    #[test]
    fn test_check_area() {
        let addr = Address::new(Area::Memory, 0, 0);
        assert!(addr.check_area(&Area::ALL).is_ok());
        let err = addr.check_area(&Area::FIELD).unwrap_err();
        assert_eq!(err.error_code(), "AREA_OUT_OF_RANGE");
    }

    #[test]
    fn test_parse_notation() {
        assert_eq!(
            "I12.3".parse::<Address>().unwrap(),
            Address::new(Area::Input, 12, 3)
        );
        assert_eq!(
            "q0.7".parse::<Address>().unwrap(),
            Address::new(Area::Output, 0, 7)
        );
        assert_eq!(
            "M5".parse::<Address>().unwrap(),
            Address::byte(Area::Memory, 5)
        );
        assert_eq!(
            "MW10".parse::<Address>().unwrap(),
            Address::byte(Area::Memory, 10)
        );
        assert_eq!(
            "QD4".parse::<Address>().unwrap(),
            Address::byte(Area::Output, 4)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for text in ["", "X1.0", "I", "I1.", "MW1.2", "I-1", "Iabc"] {
            assert!(text.parse::<Address>().is_err(), "{text} should not parse");
        }
        assert!(matches!(
            "I0.8".parse::<Address>(),
            Err(DriverError::Address(AddressError::BitOutOfRange { bit: 8 }))
        ));
    }

    #[test]
    fn test_display_roundtrip() {
        let addr = Address::new(Area::Memory, 5, 3);
        assert_eq!(addr.to_string(), "M5.3");
        assert_eq!(addr.to_string().parse::<Address>().unwrap(), addr);
    }
}
