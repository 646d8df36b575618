//! In-process register device
//!
//! Serves the same three operations as a real slave from two local tables,
//! and records the most recent transactions. Used for verifying exactly which
//! registers a backend operation touched.

use crate::constants::{
    EXCEPTION_ILLEGAL_DATA_ADDRESS, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS,
    FC_WRITE_MULTIPLE_REGISTERS,
};
use crate::link::RegisterLink;
use errors::{DriverResult, TransportError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Transactions kept before the oldest is dropped
pub const LOG_CAPACITY: usize = 1024;

/// One request seen by a [`MemoryLink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    ReadHolding { start: u16, count: usize },
    ReadInput { start: u16, count: usize },
    WriteHolding { start: u16, values: Vec<u16> },
}

impl Transaction {
    pub fn is_write(&self) -> bool {
        matches!(self, Transaction::WriteHolding { .. })
    }
}

/// Register tables plus transaction log
#[derive(Debug, Default)]
pub struct MemoryDevice {
    pub holding: Vec<u16>,
    pub input: Vec<u16>,
    pub log: VecDeque<Transaction>,
}

impl MemoryDevice {
    pub fn new(count: usize) -> Self {
        Self {
            holding: vec![0; count],
            input: vec![0; count],
            log: VecDeque::new(),
        }
    }

    fn record(&mut self, transaction: Transaction) {
        if self.log.len() == LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(transaction);
    }
}

/// Link to a [`MemoryDevice`]; clones share the device
#[derive(Debug, Clone)]
pub struct MemoryLink {
    device: Arc<Mutex<MemoryDevice>>,
}

impl MemoryLink {
    pub fn new(count: usize) -> Self {
        Self {
            device: Arc::new(Mutex::new(MemoryDevice::new(count))),
        }
    }

    /// Shared handle for inspecting or seeding the device from outside
    pub fn device(&self) -> Arc<Mutex<MemoryDevice>> {
        Arc::clone(&self.device)
    }

    /// Drain and return the transaction log
    pub fn take_log(&self) -> Vec<Transaction> {
        self.device.lock().log.drain(..).collect()
    }
}

fn window(
    table_len: usize,
    function: u8,
    start: u16,
    count: usize,
) -> DriverResult<std::ops::Range<usize>> {
    let start = start as usize;
    match start.checked_add(count) {
        Some(end) if end <= table_len => Ok(start..end),
        _ => Err(TransportError::Exception {
            function,
            code: EXCEPTION_ILLEGAL_DATA_ADDRESS,
        }
        .into()),
    }
}

impl RegisterLink for MemoryLink {
    fn read_holding(&mut self, start: u16, out: &mut [u16]) -> DriverResult<()> {
        let mut device = self.device.lock();
        device.record(Transaction::ReadHolding {
            start,
            count: out.len(),
        });
        let range = window(device.holding.len(), FC_READ_HOLDING_REGISTERS, start, out.len())?;
        out.copy_from_slice(&device.holding[range]);
        Ok(())
    }

    fn read_input(&mut self, start: u16, out: &mut [u16]) -> DriverResult<()> {
        let mut device = self.device.lock();
        device.record(Transaction::ReadInput {
            start,
            count: out.len(),
        });
        let range = window(device.input.len(), FC_READ_INPUT_REGISTERS, start, out.len())?;
        out.copy_from_slice(&device.input[range]);
        Ok(())
    }

    fn write_holding(&mut self, start: u16, values: &[u16]) -> DriverResult<()> {
        let mut device = self.device.lock();
        device.record(Transaction::WriteHolding {
            start,
            values: values.to_vec(),
        });
        let range = window(
            device.holding.len(),
            FC_WRITE_MULTIPLE_REGISTERS,
            start,
            values.len(),
        )?;
        device.holding[range].copy_from_slice(values);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("memory({} registers)", self.device.lock().holding.len())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use errors::DriverError;

    #[test]
    fn test_write_then_read_back() {
        let mut link = MemoryLink::new(8);
        link.write_holding(2, &[7, 8]).unwrap();
        let mut out = [0u16; 4];
        link.read_holding(1, &mut out).unwrap();
        assert_eq!(out, [0, 7, 8, 0]);
        assert_eq!(link.take_log().len(), 2);
        assert!(link.take_log().is_empty());
    }

    #[test]
    fn test_out_of_range_is_illegal_address() {
        let mut link = MemoryLink::new(4);
        let mut out = [0u16; 2];
        let err = link.read_input(3, &mut out).unwrap_err();
        assert_eq!(
            err,
            DriverError::Transport(TransportError::Exception {
                function: FC_READ_INPUT_REGISTERS,
                code: EXCEPTION_ILLEGAL_DATA_ADDRESS
            })
        );
    }

    #[test]
    fn test_log_keeps_latest() {
        let mut link = MemoryLink::new(1);
        for i in 0..LOG_CAPACITY + 5 {
            link.write_holding(0, &[i as u16]).unwrap();
        }
        let log = link.take_log();
        assert_eq!(log.len(), LOG_CAPACITY);
        assert_eq!(
            log[0],
            Transaction::WriteHolding {
                start: 0,
                values: vec![5]
            }
        );
    }

    #[test]
    fn test_clones_share_device() {
        let link = MemoryLink::new(2);
        let mut other = link.clone();
        other.write_holding(0, &[5]).unwrap();
        assert_eq!(link.device().lock().holding[0], 5);
    }
}
