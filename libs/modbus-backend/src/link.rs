//! Register-level device link
//!
//! The backend only needs three register operations from a device; this
//! trait is the seam between the byte/bit image and the wire.

use errors::DriverResult;

/// Synchronous access to a device's register tables.
///
/// Implementations chunk large requests themselves; `start + len` never
/// exceeds the configured register count when called from the backend.
pub trait RegisterLink: Send {
    /// FC03: fill `out` with holding registers starting at `start`
    fn read_holding(&mut self, start: u16, out: &mut [u16]) -> DriverResult<()>;

    /// FC04: fill `out` with input registers starting at `start`
    fn read_input(&mut self, start: u16, out: &mut [u16]) -> DriverResult<()>;

    /// FC16: write `values` to holding registers starting at `start`
    fn write_holding(&mut self, start: u16, values: &[u16]) -> DriverResult<()>;

    /// Short description for logs
    fn describe(&self) -> String;
}

impl<L: RegisterLink + ?Sized> RegisterLink for Box<L> {
    fn read_holding(&mut self, start: u16, out: &mut [u16]) -> DriverResult<()> {
        (**self).read_holding(start, out)
    }

    fn read_input(&mut self, start: u16, out: &mut [u16]) -> DriverResult<()> {
        (**self).read_input(start, out)
    }

    fn write_holding(&mut self, start: u16, values: &[u16]) -> DriverResult<()> {
        (**self).write_holding(start, values)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
