//! Modbus protocol constants
//!
//! Register limits follow from the 253-byte Modbus PDU limit.

// ============================================================================
// Register Operation Limits
// ============================================================================

/// FC03/FC04 response: 1 + 1 + 2N <= 253
pub const MAX_READ_REGISTERS: usize = 125;

/// FC16 request: 1 + 2 + 2 + 1 + 2N <= 253
pub const MAX_WRITE_REGISTERS: usize = 123;

/// Highest register count addressable with a 16-bit start address
pub const MAX_REGISTER_COUNT: usize = 65_535;

// ============================================================================
// Function Codes
// ============================================================================

pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

// ============================================================================
// Exception Codes
// ============================================================================

pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;
