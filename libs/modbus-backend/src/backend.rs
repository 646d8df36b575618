//! Byte/bit writes against a live register device
//!
//! Every write is a read-modify-write of exactly the registers the written
//! bytes fall into, done under the link lock so concurrent writers in this
//! process never interleave their splices.

use crate::constants::MAX_REGISTER_COUNT;
use crate::link::RegisterLink;
use crate::registers::{
    bytes_to_registers, register_span, registers_to_bytes, validate_field, RegisterSet,
};
use errors::{DriverError, DriverResult};
use parking_lot::Mutex;
use procdata::codec::{self, width};
use procdata::{Address, Value};
use serde::Serialize;
use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info};

/// Link counters
#[derive(Debug, Default)]
pub struct BackendStats {
    transactions: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of [`BackendStats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub link: String,
    pub transactions: u64,
    pub failures: u64,
}

/// Register-mapped backend over one [`RegisterLink`]
pub struct ModbusBackend {
    link: Mutex<Box<dyn RegisterLink>>,
    register_count: usize,
    description: String,
    stats: BackendStats,
}

impl ModbusBackend {
    /// `register_count` registers in each table, starting at register 0
    pub fn new(link: Box<dyn RegisterLink>, register_count: usize) -> DriverResult<Self> {
        if register_count == 0 || register_count > MAX_REGISTER_COUNT {
            return Err(DriverError::config(format!(
                "register count {register_count} outside 1..={MAX_REGISTER_COUNT}"
            )));
        }
        let description = link.describe();
        info!(
            "Modbus backend on {} ({} registers, {} bytes per area)",
            description,
            register_count,
            register_count * 2
        );
        Ok(Self {
            link: Mutex::new(link),
            register_count,
            description,
            stats: BackendStats::default(),
        })
    }

    #[inline]
    pub fn register_count(&self) -> usize {
        self.register_count
    }

    /// Addressable bytes per area
    #[inline]
    pub fn byte_count(&self) -> u32 {
        (self.register_count * 2) as u32
    }

    pub fn describe(&self) -> &str {
        &self.description
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            link: self.description.clone(),
            transactions: self.stats.transactions.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
        }
    }

    /// Run `f` with exclusive use of the link and count the outcome
    fn with_link<R>(
        &self,
        f: impl FnOnce(&mut dyn RegisterLink) -> DriverResult<R>,
    ) -> DriverResult<R> {
        let mut link = self.link.lock();
        self.stats.transactions.fetch_add(1, Ordering::Relaxed);
        let result = f(&mut **link);
        if let Err(e) = &result {
            self.stats.failures.fetch_add(1, Ordering::Relaxed);
            error!("Modbus {} failed [{}]: {}", self.description, e.error_code(), e);
        }
        result
    }

    // ========== Snapshot ==========

    /// Refresh both tables of `set` from the device
    pub fn read_registers(&self, set: &mut RegisterSet) -> DriverResult<()> {
        if set.register_count() != self.register_count {
            return Err(DriverError::not_initialized(format!(
                "register set has {} registers, backend {}",
                set.register_count(),
                self.register_count
            )));
        }
        self.with_link(|link| {
            link.read_holding(0, set.holding_mut())?;
            link.read_input(0, set.input_mut())
        })
    }

    // ========== Splicing ==========

    /// Read the registers under `width` bytes at `addr`, let `f` edit their
    /// byte view, write them back
    fn modify(
        &self,
        addr: Address,
        width: u32,
        f: impl FnOnce(&mut [u8], usize),
    ) -> DriverResult<()> {
        validate_field(&addr, self.byte_count(), width, true)?;
        let span = register_span(addr.offset(), width as usize);
        debug!("Modbus modify {} ({} bytes) via registers {:?}", addr, width, span);
        self.with_link(|link| {
            splice(link, span.clone(), |bytes| {
                f(bytes, addr.offset() - span.start * 2)
            })
        })
    }

    fn write_bytes(&self, addr: Address, bytes: &[u8]) -> DriverResult<()> {
        self.modify(addr, bytes.len() as u32, |buf, at| {
            buf[at..at + bytes.len()].copy_from_slice(bytes)
        })
    }

    // ========== Bit writes ==========

    pub fn set_bit(&self, addr: Address) -> DriverResult<()> {
        self.modify(addr, width::BIT, |buf, at| buf[at] |= addr.bit_mask())
    }

    pub fn reset_bit(&self, addr: Address) -> DriverResult<()> {
        self.modify(addr, width::BIT, |buf, at| buf[at] &= !addr.bit_mask())
    }

    pub fn invert_bit(&self, addr: Address) -> DriverResult<()> {
        self.modify(addr, width::BIT, |buf, at| buf[at] ^= addr.bit_mask())
    }

    pub fn write_bit(&self, addr: Address, value: bool) -> DriverResult<()> {
        if value {
            self.set_bit(addr)
        } else {
            self.reset_bit(addr)
        }
    }

    /// Set all bits in one locked pass. Every address is validated first;
    /// each run of adjacent registers is read and written once.
    pub fn set_bits(&self, addrs: &[Address]) -> DriverResult<()> {
        for addr in addrs {
            validate_field(addr, self.byte_count(), width::BIT, true)?;
        }
        let registers: BTreeSet<usize> = addrs.iter().map(|a| a.offset() / 2).collect();
        let runs = contiguous_runs(&registers);
        debug!(
            "Modbus set_bits: {} addresses over {} register runs",
            addrs.len(),
            runs.len()
        );

        self.with_link(|link| {
            for run in runs {
                splice(link, run.clone(), |bytes| {
                    for addr in addrs.iter().filter(|a| run.contains(&(a.offset() / 2))) {
                        bytes[addr.offset() - run.start * 2] |= addr.bit_mask();
                    }
                })?;
            }
            Ok(())
        })
    }

    // ========== Value writes ==========

    pub fn write_byte(&self, addr: Address, value: u8) -> DriverResult<()> {
        self.write_bytes(addr, &[value])
    }

    pub fn write_word(&self, addr: Address, value: u16) -> DriverResult<()> {
        self.write_bytes(addr, &codec::encode_word(value))
    }

    pub fn write_dword(&self, addr: Address, value: u32) -> DriverResult<()> {
        self.write_bytes(addr, &codec::encode_dword(value))
    }

    pub fn write_int(&self, addr: Address, value: i32) -> DriverResult<()> {
        self.write_bytes(addr, &codec::encode_int(value))
    }

    pub fn write_real(&self, addr: Address, value: f32) -> DriverResult<()> {
        self.write_bytes(addr, &codec::encode_real(value))
    }

    pub fn write_value(&self, addr: Address, value: Value) -> DriverResult<()> {
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

impl std::fmt::Debug for ModbusBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusBackend")
            .field("link", &self.description)
            .field("register_count", &self.register_count)
            .finish()
    }
}

/// Read holding registers `span`, edit their bytes, write them back
fn splice(
    link: &mut dyn RegisterLink,
    span: Range<usize>,
    edit: impl FnOnce(&mut [u8]),
) -> DriverResult<()> {
    let start = span.start as u16;
    let mut registers = vec![0u16; span.len()];
    link.read_holding(start, &mut registers)?;
    let mut bytes = registers_to_bytes(&registers);
    edit(&mut bytes);
    link.write_holding(start, &bytes_to_registers(&bytes))
}

fn contiguous_runs(registers: &BTreeSet<usize>) -> Vec<Range<usize>> {
    let mut runs: Vec<Range<usize>> = Vec::new();
    for &reg in registers {
        match runs.last_mut() {
            Some(run) if run.end == reg => run.end += 1,
            _ => runs.push(reg..reg + 1),
        }
    }
    runs
}
