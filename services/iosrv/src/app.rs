//! Blocking bodies of the iosrv subcommands
//!
//! Everything here runs on a blocking thread: the shm handshake and the
//! Modbus link both block the caller for one round trip.

use crate::cli::Request;
use common::config::{BackendConfig, ShmConfig};
use drivers::factory::shm_options;
use drivers::{open_driver, spawn_update_task, DriverSet, ProcessDataReader, ProcessDataWriter};
use errors::{DriverError, DriverResult};
use procdata::{Address, Area, DataType, ProcessImage, Value};
use serde::Serialize;
use shm_transport::{ShmClient, ShmServer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

// ============================================================================
// serve
// ============================================================================

/// Run the shm server until EXIT or `stop`
pub fn serve(config: &ShmConfig, stop: &AtomicBool) -> DriverResult<()> {
    let server = ShmServer::create(&config.path, config.area_size, config.lock_timeout())?;
    server.run(config.poll_interval(), stop)?;
    if server.exit_requested() {
        info!("Stopped by EXIT command");
    }
    Ok(())
}

// ============================================================================
// send
// ============================================================================

/// Execute one request. PING and EXIT only exist on the shm link.
pub fn send(backend: &BackendConfig, request: &Request) -> DriverResult<()> {
    match (request, backend) {
        (Request::Ping | Request::Exit, BackendConfig::Shm(shm)) => {
            let client = ShmClient::attach(&shm.path, shm_options(shm))?;
            if *request == Request::Ping {
                client.ping()
            } else {
                client.exit()
            }
        },
        (Request::Ping | Request::Exit, BackendConfig::Modbus(_)) => Err(DriverError::config(
            "ping/exit are shm server commands; use --backend shm",
        )),
        _ => {
            let set = open_driver(backend)?;
            apply(set.writer.as_ref(), request)
        },
    }
}

/// Map a write request onto a writer
pub fn apply(writer: &dyn ProcessDataWriter, request: &Request) -> DriverResult<()> {
    match request {
        Request::SetBit(addr) => writer.set_bit(*addr),
        Request::ResetBit(addr) => writer.reset_bit(*addr),
        Request::InvertBit(addr) => writer.invert_bit(*addr),
        Request::SetBits(addrs) => writer.set_bits(addrs),
        Request::Write(addr, value) => writer.write_value(*addr, *value),
        Request::Ping | Request::Exit => Err(DriverError::config(format!(
            "{request:?} is not a process-data write"
        ))),
    }
}

// ============================================================================
// read
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub address: String,
    #[serde(flatten)]
    pub value: Value,
}

/// One update, then read every address from the refreshed snapshot
pub fn read(
    backend: &BackendConfig,
    addresses: &[Address],
    data_type: DataType,
) -> DriverResult<Vec<Reading>> {
    let DriverSet {
        mut reader,
        mut updater,
        ..
    } = open_driver(backend)?;
    updater.update()?;
    reader.update_process_data()?;
    read_all(reader.as_ref(), addresses, data_type)
}

pub fn read_all(
    reader: &dyn ProcessDataReader,
    addresses: &[Address],
    data_type: DataType,
) -> DriverResult<Vec<Reading>> {
    addresses
        .iter()
        .map(|addr| {
            Ok(Reading {
                address: addr.to_string(),
                value: reader.get_value(*addr, data_type)?,
            })
        })
        .collect()
}

// ============================================================================
// poll
// ============================================================================

/// Byte-level change detector over successive snapshots
#[derive(Debug, Default)]
pub struct ChangeTracker {
    previous: Vec<(Area, Vec<u8>)>,
}

impl ChangeTracker {
    /// `(address, old, new)` for every byte that differs from the last call.
    /// The first call only records the baseline.
    pub fn diff(&mut self, image: &dyn ProcessImage) -> Vec<(Address, u8, u8)> {
        let len = image.byte_count() as usize;
        let current: Vec<(Area, Vec<u8>)> = image
            .areas()
            .iter()
            .map(|&area| {
                let mut bytes = vec![0u8; len];
                image.read_raw(area, 0, &mut bytes);
                (area, bytes)
            })
            .collect();

        let mut changes = Vec::new();
        if self.previous.len() == current.len() {
            for ((area, old), (_, new)) in self.previous.iter().zip(&current) {
                for (i, (o, n)) in old.iter().zip(new).enumerate() {
                    if o != n {
                        changes.push((Address::byte(*area, i as u32), *o, *n));
                    }
                }
            }
        }
        self.previous = current;
        changes
    }
}

/// Poll until `stop`, logging every changed byte
pub fn poll(
    backend: &BackendConfig,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> DriverResult<()> {
    let DriverSet {
        mut reader,
        updater,
        ..
    } = open_driver(backend)?;
    let task = spawn_update_task(updater, interval, Arc::clone(&stop))?;

    let mut tracker = ChangeTracker::default();
    let mut cycles: u64 = 0;
    while !stop.load(Ordering::Acquire) {
        match reader.update_process_data() {
            Ok(()) => {
                for (addr, old, new) in tracker.diff(reader.snapshot()) {
                    info!("{}: 0x{:02X} -> 0x{:02X}", addr, old, new);
                }
                cycles += 1;
            },
            Err(e) => warn!("Snapshot refresh failed [{}]: {}", e.error_code(), e),
        }
        std::thread::sleep(interval);
    }

    // Joining hands the updater back; it drops here, on this thread
    match task.join() {
        Ok(updater) => info!("Poll stopped after {} cycles on {}", cycles, updater.describe()),
        Err(_) => warn!("Updater thread panicked"),
    }
    Ok(())
}
