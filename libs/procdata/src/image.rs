//! Validated typed access over a process image
//!
//! [`ProcessImage`] is implemented by anything that can expose fixed-size
//! byte regions per [`Area`]: the owned [`ProcessData`](crate::ProcessData)
//! store, the borrowed shared-memory mirror and the Modbus register snapshot.
//! Implementors provide two raw primitives; every typed accessor is a
//! provided method that validates the address before the raw primitive runs,
//! so a rejected call never mutates anything.

use crate::address::Address;
use crate::area::Area;
use crate::codec::{self, width};
use crate::value::{DataType, Value};
use errors::DriverResult;

pub trait ProcessImage {
    /// Areas this image can address
    fn areas(&self) -> &[Area];

    /// Addressable bytes per area (identical for every area)
    fn byte_count(&self) -> u32;

    /// Copy `buf.len()` bytes starting at `offset` into `buf`.
    ///
    /// The window must already be validated.
    fn read_raw(&self, area: Area, offset: usize, buf: &mut [u8]);

    /// Overwrite `bytes.len()` bytes starting at `offset`.
    ///
    /// The window must already be validated. Must not touch bytes outside it.
    fn write_raw(&mut self, area: Area, offset: usize, bytes: &[u8]);

    // ========== Validation ==========

    fn check_area(&self, addr: &Address) -> DriverResult<()> {
        addr.check_area(self.areas())
    }

    /// Extra restriction applied to mutating calls only
    fn check_writable(&self, _addr: &Address) -> DriverResult<()> {
        Ok(())
    }

    fn validate(&self, addr: &Address, width: u32) -> DriverResult<()> {
        addr.check_bit()?;
        self.check_area(addr)?;
        addr.check_byte(self.byte_count(), width)
    }

    fn validate_write(&self, addr: &Address, width: u32) -> DriverResult<()> {
        self.validate(addr, width)?;
        self.check_writable(addr)
    }

    // ========== Reads ==========

    fn get_bit(&self, addr: Address) -> DriverResult<bool> {
        self.validate(&addr, width::BIT)?;
        let [byte] = read_array::<1, _>(self, &addr);
        Ok(byte & addr.bit_mask() != 0)
    }

    /// One result per address, in input order
    fn get_bits(&self, addrs: &[Address]) -> DriverResult<Vec<bool>> {
        addrs.iter().map(|addr| self.get_bit(*addr)).collect()
    }

    fn get_byte(&self, addr: Address) -> DriverResult<u8> {
        self.validate(&addr, width::BYTE)?;
        let [byte] = read_array::<1, _>(self, &addr);
        Ok(byte)
    }

    fn get_word(&self, addr: Address) -> DriverResult<u16> {
        self.validate(&addr, width::WORD)?;
        Ok(codec::decode_word(read_array(self, &addr)))
    }

    fn get_dword(&self, addr: Address) -> DriverResult<u32> {
        self.validate(&addr, width::DWORD)?;
        Ok(codec::decode_dword(read_array(self, &addr)))
    }

    fn get_int(&self, addr: Address) -> DriverResult<i32> {
        self.validate(&addr, width::INT)?;
        Ok(codec::decode_int(read_array(self, &addr)))
    }

    fn get_real(&self, addr: Address) -> DriverResult<f32> {
        self.validate(&addr, width::REAL)?;
        Ok(codec::decode_real(read_array(self, &addr)))
    }

    fn get_value(&self, addr: Address, data_type: DataType) -> DriverResult<Value> {
        Ok(match data_type {
            DataType::Bit => Value::Bit(self.get_bit(addr)?),
            DataType::Byte => Value::Byte(self.get_byte(addr)?),
            DataType::Word => Value::Word(self.get_word(addr)?),
            DataType::DWord => Value::DWord(self.get_dword(addr)?),
            DataType::Int => Value::Int(self.get_int(addr)?),
            DataType::Real => Value::Real(self.get_real(addr)?),
        })
    }

    // ========== Bit writes ==========

    fn set_bit(&mut self, addr: Address) -> DriverResult<()> {
        self.validate_write(&addr, width::BIT)?;
        update_byte(self, &addr, |b| b | addr.bit_mask());
        Ok(())
    }

    fn reset_bit(&mut self, addr: Address) -> DriverResult<()> {
        self.validate_write(&addr, width::BIT)?;
        update_byte(self, &addr, |b| b & !addr.bit_mask());
        Ok(())
    }

    fn invert_bit(&mut self, addr: Address) -> DriverResult<()> {
        self.validate_write(&addr, width::BIT)?;
        update_byte(self, &addr, |b| b ^ addr.bit_mask());
        Ok(())
    }

    fn write_bit(&mut self, addr: Address, value: bool) -> DriverResult<()> {
        if value {
            self.set_bit(addr)
        } else {
            self.reset_bit(addr)
        }
    }

    /// Set every addressed bit. All addresses are validated before the first
    /// bit changes, so a bad address leaves the image untouched.
    fn set_bits(&mut self, addrs: &[Address]) -> DriverResult<()> {
        for addr in addrs {
            self.validate_write(addr, width::BIT)?;
        }
        for addr in addrs {
            update_byte(self, addr, |b| b | addr.bit_mask());
        }
        Ok(())
    }

    // ========== Value writes ==========

    fn write_byte(&mut self, addr: Address, value: u8) -> DriverResult<()> {
        self.validate_write(&addr, width::BYTE)?;
        self.write_raw(addr.area, addr.offset(), &[value]);
        Ok(())
    }

    fn write_word(&mut self, addr: Address, value: u16) -> DriverResult<()> {
        self.validate_write(&addr, width::WORD)?;
        self.write_raw(addr.area, addr.offset(), &codec::encode_word(value));
        Ok(())
    }

    fn write_dword(&mut self, addr: Address, value: u32) -> DriverResult<()> {
        self.validate_write(&addr, width::DWORD)?;
        self.write_raw(addr.area, addr.offset(), &codec::encode_dword(value));
        Ok(())
    }

    fn write_int(&mut self, addr: Address, value: i32) -> DriverResult<()> {
        self.validate_write(&addr, width::INT)?;
        self.write_raw(addr.area, addr.offset(), &codec::encode_int(value));
        Ok(())
    }

    fn write_real(&mut self, addr: Address, value: f32) -> DriverResult<()> {
        self.validate_write(&addr, width::REAL)?;
        self.write_raw(addr.area, addr.offset(), &codec::encode_real(value));
        Ok(())
    }

    fn write_value(&mut self, addr: Address, value: Value) -> DriverResult<()> {
        match value {
            Value::Bit(v) => self.write_bit(addr, v),
            Value::Byte(v) => self.write_byte(addr, v),
            Value::Word(v) => self.write_word(addr, v),
            Value::DWord(v) => self.write_dword(addr, v),
            Value::Int(v) => self.write_int(addr, v),
            Value::Real(v) => self.write_real(addr, v),
        }
    }
}

fn read_array<const N: usize, I>(image: &I, addr: &Address) -> [u8; N]
where
    I: ProcessImage + ?Sized,
{
    let mut buf = [0u8; N];
    image.read_raw(addr.area, addr.offset(), &mut buf);
    buf
}

fn update_byte<I, F>(image: &mut I, addr: &Address, f: F)
where
    I: ProcessImage + ?Sized,
    F: FnOnce(u8) -> u8,
{
    let [byte] = read_array::<1, _>(image, addr);
    image.write_raw(addr.area, addr.offset(), &[f(byte)]);
}
