//! Capabilities over the shared-memory link
//!
//! The updater copies the server's mirror into a local buffer it owns;
//! readers snapshot that buffer. Writes become mailbox commands.

use crate::capability::{ProcessDataReader, ProcessDataUpdater, ProcessDataWriter};
use errors::DriverResult;
use procdata::{Access, Address, Container, ProcessData, ProcessImage};
use shm_transport::ShmClient;
use std::sync::Arc;
use tracing::debug;

// ========== Reader ==========

#[derive(Debug)]
pub struct ShmReader {
    shared: Access<ProcessData>,
    snapshot: ProcessData,
}

impl ShmReader {
    pub fn new(shared: Access<ProcessData>, area_size: usize) -> Self {
        Self {
            shared,
            snapshot: ProcessData::new(area_size),
        }
    }
}

impl ProcessDataReader for ShmReader {
    fn snapshot(&self) -> &dyn ProcessImage {
        &self.snapshot
    }

    fn update_process_data(&mut self) -> DriverResult<()> {
        let shared = self.shared.lock()?;
        self.snapshot.copy_from(&shared)
    }

    fn create_new(&self) -> Box<dyn ProcessDataReader> {
        Box::new(ShmReader {
            shared: self.shared.clone(),
            snapshot: self.snapshot.clone(),
        })
    }
}

// ========== Writer ==========

#[derive(Debug, Clone)]
pub struct ShmWriter {
    client: Arc<ShmClient>,
}

impl ShmWriter {
    pub fn new(client: Arc<ShmClient>) -> Self {
        Self { client }
    }
}

impl ProcessDataWriter for ShmWriter {
    fn set_bit(&self, addr: Address) -> DriverResult<()> {
        self.client.set_bit(addr)
    }

    fn reset_bit(&self, addr: Address) -> DriverResult<()> {
        self.client.reset_bit(addr)
    }

    fn invert_bit(&self, addr: Address) -> DriverResult<()> {
        self.client.invert_bit(addr)
    }

    fn set_bits(&self, addrs: &[Address]) -> DriverResult<()> {
        self.client.set_bits(addrs)
    }

    fn write_byte(&self, addr: Address, value: u8) -> DriverResult<()> {
        self.client.write_byte(addr, value)
    }

    fn write_word(&self, addr: Address, value: u16) -> DriverResult<()> {
        self.client.write_word(addr, value)
    }

    fn write_dword(&self, addr: Address, value: u32) -> DriverResult<()> {
        self.client.write_dword(addr, value)
    }

    fn write_int(&self, addr: Address, value: i32) -> DriverResult<()> {
        self.client.write_int(addr, value)
    }

    fn write_real(&self, addr: Address, value: f32) -> DriverResult<()> {
        self.client.write_real(addr, value)
    }
}

// ========== Updater ==========

/// Owner of the local buffer; dropping it invalidates every reader
#[derive(Debug)]
pub struct ShmUpdater {
    client: Arc<ShmClient>,
    shared: Container<ProcessData>,
    scratch: ProcessData,
}

impl ShmUpdater {
    pub fn new(client: Arc<ShmClient>) -> Self {
        let area_size = client.area_size();
        Self {
            client,
            shared: Container::new(ProcessData::new(area_size)),
            scratch: ProcessData::new(area_size),
        }
    }

    /// Handle for a new reader
    pub fn access(&self) -> Access<ProcessData> {
        self.shared.access()
    }
}

impl ProcessDataUpdater for ShmUpdater {
    fn update(&mut self) -> DriverResult<()> {
        // Segment lock and local lock are never held together
        self.client.read_process_data(&mut self.scratch)?;
        self.shared.lock().copy_from(&self.scratch)?;
        debug!("Shm process data refreshed");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("shm ({} bytes per area)", self.client.area_size())
    }
}
