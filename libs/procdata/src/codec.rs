//! Little-endian encode/decode for process-data values
//!
//! Multi-byte values in the process image are stored little-endian. The
//! 32-bit INT and REAL types are bit-for-bit reinterpretations of the same
//! 4-byte pattern as a DWORD; the conversions here make that reinterpretation
//! explicit instead of relying on memory layout.

/// Width in bytes of each access type
pub mod width {
    pub const BIT: u32 = 1;
    pub const BYTE: u32 = 1;
    pub const WORD: u32 = 2;
    pub const DWORD: u32 = 4;
    pub const INT: u32 = 4;
    pub const REAL: u32 = 4;
}

// ============================================================================
// 16/32-bit little-endian
// ============================================================================

#[inline]
pub fn decode_word(bytes: [u8; 2]) -> u16 {
    u16::from_le_bytes(bytes)
}

#[inline]
pub fn encode_word(value: u16) -> [u8; 2] {
    value.to_le_bytes()
}

#[inline]
pub fn decode_dword(bytes: [u8; 4]) -> u32 {
    u32::from_le_bytes(bytes)
}

#[inline]
pub fn encode_dword(value: u32) -> [u8; 4] {
    value.to_le_bytes()
}

// ============================================================================
// Bit-pattern reinterpretation
// ============================================================================

/// Reinterpret a 32-bit pattern as two's-complement
#[inline]
pub fn int_from_bits(bits: u32) -> i32 {
    bits as i32
}

#[inline]
pub fn int_to_bits(value: i32) -> u32 {
    value as u32
}

/// Reinterpret a 32-bit pattern as IEEE-754 single precision
#[inline]
pub fn real_from_bits(bits: u32) -> f32 {
    f32::from_bits(bits)
}

#[inline]
pub fn real_to_bits(value: f32) -> u32 {
    value.to_bits()
}

#[inline]
pub fn decode_int(bytes: [u8; 4]) -> i32 {
    int_from_bits(decode_dword(bytes))
}

#[inline]
pub fn encode_int(value: i32) -> [u8; 4] {
    encode_dword(int_to_bits(value))
}

#[inline]
pub fn decode_real(bytes: [u8; 4]) -> f32 {
    real_from_bits(decode_dword(bytes))
}

#[inline]
pub fn encode_real(value: f32) -> [u8; 4] {
    encode_dword(real_to_bits(value))
}
