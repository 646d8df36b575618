//! Reader / Writer / Updater capabilities over the shm and Modbus backends
//!
//! ```no_run
//! use drivers::open_shm_driver;
//! use procdata::{Address, Area};
//! use shm_transport::ShmOptions;
//! use std::path::Path;
//!
//! # fn main() -> errors::DriverResult<()> {
//! let mut set = open_shm_driver(Path::new("/dev/shm/iosrv.shm"), ShmOptions::default())?;
//! set.writer.set_bit(Address::new(Area::Memory, 5, 3))?;
//!
//! set.updater.update()?;
//! set.reader.update_process_data()?;
//! assert_eq!(set.reader.get_byte(Address::byte(Area::Memory, 5))?, 8);
//! # Ok(())
//! # }
//! ```

pub mod capability;
pub mod factory;
pub mod modbus;
pub mod shm;
pub mod task;

pub use capability::{ProcessDataReader, ProcessDataUpdater, ProcessDataWriter};
pub use factory::{open_driver, open_modbus_driver, open_shm_driver, DriverSet};
pub use modbus::{ModbusReader, ModbusUpdater, ModbusWriter};
pub use shm::{ShmReader, ShmUpdater, ShmWriter};
pub use task::spawn_update_task;
