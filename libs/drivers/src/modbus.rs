//! Capabilities over a Modbus register backend
//!
//! The updater performs the actual field read; readers snapshot the register
//! set it maintains. Writers go through the backend's read-modify-write path.

use crate::capability::{ProcessDataReader, ProcessDataUpdater, ProcessDataWriter};
use errors::DriverResult;
use modbus_backend::{ModbusBackend, RegisterSet};
use procdata::{Access, Address, Container, ProcessImage};
use std::sync::Arc;
use tracing::debug;

// ========== Reader ==========

#[derive(Debug)]
pub struct ModbusReader {
    shared: Access<RegisterSet>,
    snapshot: RegisterSet,
}

impl ModbusReader {
    pub fn new(shared: Access<RegisterSet>, register_count: usize) -> Self {
        Self {
            shared,
            snapshot: RegisterSet::new(register_count),
        }
    }
}

impl ProcessDataReader for ModbusReader {
    fn snapshot(&self) -> &dyn ProcessImage {
        &self.snapshot
    }

    fn update_process_data(&mut self) -> DriverResult<()> {
        let shared = self.shared.lock()?;
        self.snapshot.copy_from(&shared)
    }

    fn create_new(&self) -> Box<dyn ProcessDataReader> {
        Box::new(ModbusReader {
            shared: self.shared.clone(),
            snapshot: self.snapshot.clone(),
        })
    }
}

// ========== Writer ==========

#[derive(Debug, Clone)]
pub struct ModbusWriter {
    backend: Arc<ModbusBackend>,
}

impl ModbusWriter {
    pub fn new(backend: Arc<ModbusBackend>) -> Self {
        Self { backend }
    }
}

impl ProcessDataWriter for ModbusWriter {
    fn set_bit(&self, addr: Address) -> DriverResult<()> {
        self.backend.set_bit(addr)
    }

    fn reset_bit(&self, addr: Address) -> DriverResult<()> {
        self.backend.reset_bit(addr)
    }

    fn invert_bit(&self, addr: Address) -> DriverResult<()> {
        self.backend.invert_bit(addr)
    }

    fn set_bits(&self, addrs: &[Address]) -> DriverResult<()> {
        self.backend.set_bits(addrs)
    }

    fn write_byte(&self, addr: Address, value: u8) -> DriverResult<()> {
        self.backend.write_byte(addr, value)
    }

    fn write_word(&self, addr: Address, value: u16) -> DriverResult<()> {
        self.backend.write_word(addr, value)
    }

    fn write_dword(&self, addr: Address, value: u32) -> DriverResult<()> {
        self.backend.write_dword(addr, value)
    }

    fn write_int(&self, addr: Address, value: i32) -> DriverResult<()> {
        self.backend.write_int(addr, value)
    }

    fn write_real(&self, addr: Address, value: f32) -> DriverResult<()> {
        self.backend.write_real(addr, value)
    }
}

// ========== Updater ==========

#[derive(Debug)]
pub struct ModbusUpdater {
    backend: Arc<ModbusBackend>,
    shared: Container<RegisterSet>,
    scratch: RegisterSet,
}

impl ModbusUpdater {
    pub fn new(backend: Arc<ModbusBackend>) -> Self {
        let count = backend.register_count();
        Self {
            backend,
            shared: Container::new(RegisterSet::new(count)),
            scratch: RegisterSet::new(count),
        }
    }

    pub fn access(&self) -> Access<RegisterSet> {
        self.shared.access()
    }

    pub fn backend(&self) -> &Arc<ModbusBackend> {
        &self.backend
    }
}

impl ProcessDataUpdater for ModbusUpdater {
    fn update(&mut self) -> DriverResult<()> {
        // Field I/O happens outside the reader-facing lock
        self.backend.read_registers(&mut self.scratch)?;
        self.shared.lock().copy_from(&self.scratch)?;
        debug!("Modbus registers refreshed from {}", self.backend.describe());
        Ok(())
    }

    fn describe(&self) -> String {
        self.backend.describe().to_string()
    }
}
