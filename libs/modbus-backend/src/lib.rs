//! Modbus register backend
//!
//! Maps the byte/bit process image onto two 16-bit register tables of a
//! Modbus device: INPUT reads input registers, OUTPUT reads and writes
//! holding registers, MEMORY is not available. See [`registers`] for the
//! byte-to-register mapping. The TCP link is built on `tokio-modbus`.
//!
//! ```no_run
//! use modbus_backend::{ModbusBackend, ModbusTcpLink, RegisterSet, TcpLinkConfig};
//! use procdata::{Address, Area, ProcessImage};
//!
//! # fn main() -> errors::DriverResult<()> {
//! let link = ModbusTcpLink::new(TcpLinkConfig::new("192.168.1.10", 502))?;
//! let backend = ModbusBackend::new(Box::new(link), 100)?;
//! backend.write_word(Address::byte(Area::Output, 3), 0xBEEF)?;
//!
//! let mut snapshot = RegisterSet::new(100);
//! backend.read_registers(&mut snapshot)?;
//! assert_eq!(snapshot.get_word(Address::byte(Area::Output, 3))?, 0xBEEF);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod constants;
pub mod link;
pub mod memory;
pub mod registers;
pub mod tcp;

pub use backend::{BackendStats, ModbusBackend, StatsSnapshot};
pub use link::RegisterLink;
pub use memory::{MemoryDevice, MemoryLink, Transaction};
pub use registers::RegisterSet;
pub use tcp::{ModbusTcpLink, TcpLinkConfig};
