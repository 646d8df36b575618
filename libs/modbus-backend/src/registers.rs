//! Byte/bit process image over two 16-bit register tables
//!
//! Byte offset `k` lives in register `k / 2`: even offsets are the low byte,
//! odd offsets the high byte. A register therefore reads back as the
//! little-endian WORD at byte `2 * index`, and a value starting at an odd
//! byte straddles a register boundary.
//!
//! | Area   | Table             | Access     |
//! |--------|-------------------|------------|
//! | INPUT  | input registers   | read-only  |
//! | OUTPUT | holding registers | read/write |
//! | MEMORY | none              | rejected   |

use errors::{AddressError, DriverError, DriverResult};
use procdata::{Address, Area, ProcessImage};
use std::ops::Range;

// ========== Byte <-> register mapping ==========

/// Byte `offset` out of a register table
#[inline]
pub fn byte_at(registers: &[u16], offset: usize) -> u8 {
    let [low, high] = registers[offset / 2].to_le_bytes();
    if offset % 2 == 0 {
        low
    } else {
        high
    }
}

/// Overwrite byte `offset` and keep the other byte of its register
#[inline]
pub fn set_byte_at(registers: &mut [u16], offset: usize, value: u8) {
    let reg = &mut registers[offset / 2];
    let mut bytes = reg.to_le_bytes();
    bytes[offset % 2] = value;
    *reg = u16::from_le_bytes(bytes);
}

/// Registers touched by `width` bytes starting at byte `offset`
pub fn register_span(offset: usize, width: usize) -> Range<usize> {
    let first = offset / 2;
    let last = (offset + width.max(1) - 1) / 2;
    first..last + 1
}

/// Flatten registers into their byte view
pub fn registers_to_bytes(registers: &[u16]) -> Vec<u8> {
    registers.iter().flat_map(|r| r.to_le_bytes()).collect()
}

/// Inverse of [`registers_to_bytes`]; `bytes` must have even length
pub fn bytes_to_registers(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

// ========== Area rules ==========

/// MEMORY has no register table
pub fn check_field_area(addr: &Address) -> DriverResult<()> {
    if addr.area == Area::Memory {
        return Err(AddressError::AreaNotAllowed {
            area: addr.area.to_string(),
        }
        .into());
    }
    Ok(())
}

/// INPUT registers are read-only
pub fn check_field_writable(addr: &Address) -> DriverResult<()> {
    if addr.area == Area::Input {
        return Err(AddressError::WriteToInputNotAllowed { byte: addr.byte }.into());
    }
    Ok(())
}

/// Full check for a register-mapped access: bit, area, byte window, and
/// writability when `write` is set
pub fn validate_field(
    addr: &Address,
    byte_count: u32,
    width: u32,
    write: bool,
) -> DriverResult<()> {
    addr.check_bit()?;
    check_field_area(addr)?;
    addr.check_byte(byte_count, width)?;
    if write {
        check_field_writable(addr)?;
    }
    Ok(())
}

// ========== RegisterSet ==========

/// Local copy of a device's holding and input registers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSet {
    holding: Vec<u16>,
    input: Vec<u16>,
}

impl RegisterSet {
    /// `count` registers in each table
    pub fn new(count: usize) -> Self {
        Self {
            holding: vec![0; count],
            input: vec![0; count],
        }
    }

    #[inline]
    pub fn register_count(&self) -> usize {
        self.holding.len()
    }

    pub fn holding(&self) -> &[u16] {
        &self.holding
    }

    pub fn holding_mut(&mut self) -> &mut [u16] {
        &mut self.holding
    }

    pub fn input(&self) -> &[u16] {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut [u16] {
        &mut self.input
    }

    /// Register table backing `area`, if any
    pub fn table(&self, area: Area) -> Option<&[u16]> {
        match area {
            Area::Input => Some(&self.input),
            Area::Output => Some(&self.holding),
            Area::Memory => None,
        }
    }

    fn table_mut(&mut self, area: Area) -> Option<&mut [u16]> {
        match area {
            Area::Input => Some(&mut self.input),
            Area::Output => Some(&mut self.holding),
            Area::Memory => None,
        }
    }

    /// Replace both tables with `other`'s. Geometry must match.
    pub fn copy_from(&mut self, other: &RegisterSet) -> DriverResult<()> {
        if other.register_count() != self.register_count() {
            return Err(DriverError::not_initialized(format!(
                "register set geometry mismatch: {} vs {} registers",
                self.register_count(),
                other.register_count()
            )));
        }
        self.holding.copy_from_slice(&other.holding);
        self.input.copy_from_slice(&other.input);
        Ok(())
    }
}

impl ProcessImage for RegisterSet {
    fn areas(&self) -> &[Area] {
        &Area::FIELD
    }

    fn byte_count(&self) -> u32 {
        (self.register_count() * 2) as u32
    }

    fn check_area(&self, addr: &Address) -> DriverResult<()> {
        check_field_area(addr)
    }

    fn check_writable(&self, addr: &Address) -> DriverResult<()> {
        check_field_writable(addr)
    }

    fn read_raw(&self, area: Area, offset: usize, buf: &mut [u8]) {
        if let Some(table) = self.table(area) {
            for (i, b) in buf.iter_mut().enumerate() {
                *b = byte_at(table, offset + i);
            }
        }
    }

    fn write_raw(&mut self, area: Area, offset: usize, bytes: &[u8]) {
        if let Some(table) = self.table_mut(area) {
            for (i, b) in bytes.iter().enumerate() {
                set_byte_at(table, offset + i, *b);
            }
        }
    }
}
