//! Logical I/O areas of the process image

use errors::{DriverResult, ProtocolError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three logical regions of the process image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Area {
    /// Inputs read from the field
    Input,
    /// Outputs written to the field
    Output,
    /// Local markers, only meaningful without a field device
    Memory,
}

impl Area {
    /// All areas in wire-code order
    pub const ALL: [Area; 3] = [Area::Input, Area::Output, Area::Memory];

    /// Areas a register-mapped field device can serve
    pub const FIELD: [Area; 2] = [Area::Input, Area::Output];

    /// Wire code used in shared-memory command payloads
    #[inline]
    pub const fn code(self) -> i32 {
        match self {
            Area::Input => 0,
            Area::Output => 1,
            Area::Memory => 2,
        }
    }

    /// Decode a wire code
    pub fn from_code(code: i32) -> DriverResult<Self> {
        match code {
            0 => Ok(Area::Input),
            1 => Ok(Area::Output),
            2 => Ok(Area::Memory),
            other => Err(ProtocolError::UnknownArea(other).into()),
        }
    }

    /// Position of this area inside contiguous area storage
    #[inline]
    pub const fn index(self) -> usize {
        self.code() as usize
    }

    /// PLC notation prefix (`I`, `Q`, `M`)
    pub const fn prefix(self) -> char {
        match self {
            Area::Input => 'I',
            Area::Output => 'Q',
            Area::Memory => 'M',
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Area::Input => "INPUT",
            Area::Output => "OUTPUT",
            Area::Memory => "MEMORY",
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
