//! Driver capability traits
//!
//! Consumers (tag logger, scripts, alarms) see a backend only through these
//! three traits. They are deliberately asymmetric:
//!
//! - a reader answers from its own snapshot and never touches the backend
//! - a writer goes straight to the backend on every call
//! - an updater moves fresh backend data into the buffer readers copy from

use errors::DriverResult;
use procdata::{Address, DataType, ProcessImage, Value};

// ============================================================================
// Reader
// ============================================================================

/// Snapshot-based read access
///
/// Every `get_*` answers from the same private snapshot, so a batch of reads
/// between two [`update_process_data`](Self::update_process_data) calls is
/// consistent and never torn.
pub trait ProcessDataReader: Send {
    /// Current private snapshot
    fn snapshot(&self) -> &dyn ProcessImage;

    /// Replace the snapshot with the backend's shared buffer
    fn update_process_data(&mut self) -> DriverResult<()>;

    /// Independent reader on the same backend, starting from a copy of this
    /// reader's snapshot
    fn create_new(&self) -> Box<dyn ProcessDataReader>;

    fn get_bit(&self, addr: Address) -> DriverResult<bool> {
        self.snapshot().get_bit(addr)
    }

    fn get_bits(&self, addrs: &[Address]) -> DriverResult<Vec<bool>> {
        self.snapshot().get_bits(addrs)
    }

    fn get_byte(&self, addr: Address) -> DriverResult<u8> {
        self.snapshot().get_byte(addr)
    }

    fn get_word(&self, addr: Address) -> DriverResult<u16> {
        self.snapshot().get_word(addr)
    }

    fn get_dword(&self, addr: Address) -> DriverResult<u32> {
        self.snapshot().get_dword(addr)
    }

    fn get_int(&self, addr: Address) -> DriverResult<i32> {
        self.snapshot().get_int(addr)
    }

    fn get_real(&self, addr: Address) -> DriverResult<f32> {
        self.snapshot().get_real(addr)
    }

    fn get_value(&self, addr: Address, data_type: DataType) -> DriverResult<Value> {
        self.snapshot().get_value(addr, data_type)
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Uncached write access; shared between threads
pub trait ProcessDataWriter: Send + Sync {
    fn set_bit(&self, addr: Address) -> DriverResult<()>;

    fn reset_bit(&self, addr: Address) -> DriverResult<()>;

    fn invert_bit(&self, addr: Address) -> DriverResult<()>;

    /// Set every addressed bit; nothing changes if any address is invalid
    fn set_bits(&self, addrs: &[Address]) -> DriverResult<()>;

    fn write_byte(&self, addr: Address, value: u8) -> DriverResult<()>;

    fn write_word(&self, addr: Address, value: u16) -> DriverResult<()>;

    fn write_dword(&self, addr: Address, value: u32) -> DriverResult<()>;

    fn write_int(&self, addr: Address, value: i32) -> DriverResult<()>;

    fn write_real(&self, addr: Address, value: f32) -> DriverResult<()>;

    fn write_bit(&self, addr: Address, value: bool) -> DriverResult<()> {
        if value {
            self.set_bit(addr)
        } else {
            self.reset_bit(addr)
        }
    }

    fn write_value(&self, addr: Address, value: Value) -> DriverResult<()> {
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

// ============================================================================
// Updater
// ============================================================================

/// Refreshes the shared buffer that readers snapshot from
pub trait ProcessDataUpdater: Send {
    fn update(&mut self) -> DriverResult<()>;

    /// Backend description for logs
    fn describe(&self) -> String;
}
