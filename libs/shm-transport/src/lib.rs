//! Shared-memory link between an I/O server process and its clients
//!
//! One segment file holds a command mailbox, the process-shared locks and
//! condition that guard it, and a mirror of the process image. The server
//! creates the segment and polls the mailbox; clients attach, post one
//! request at a time and wait (bounded) for the reply.
//!
//! # Example
//!
//! ```no_run
//! use shm_transport::{ShmClient, ShmOptions};
//! use procdata::{Address, Area};
//! use std::path::Path;
//!
//! # fn main() -> errors::DriverResult<()> {
//! let client = ShmClient::attach(Path::new("/dev/shm/iosrv.shm"), ShmOptions::default())?;
//! client.ping()?;
//! client.set_bit(Address::new(Area::Memory, 5, 3))?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod command;
pub mod layout;
pub mod segment;
pub mod server;
pub mod sync;

pub use client::{ShmClient, ShmOptions};
pub use command::{id, reply, Command, MAX_SET_BITS, MAX_VALUES};
pub use layout::Mailbox;
pub use segment::Segment;
pub use server::{PollOutcome, ServerStats, ShmServer};
