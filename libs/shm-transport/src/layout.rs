//! Fixed memory layout of the shared segment
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ SegmentHeader (64 bytes)                     │
//! ├──────────────────────────────────────────────┤
//! │ mailbox: ShmMutex<Mailbox>                   │
//! │ reply_lock: ShmMutex<()>                     │
//! │ reply_signal: ShmCondvar                     │
//! │ data_lock: ShmMutex<()>                      │
//! ├──────────────────────────────────────────────┤  <- DATA_OFFSET
//! │ input  [area_size bytes]                     │
//! │ output [area_size bytes]                     │
//! │ memory [area_size bytes]                     │
//! └──────────────────────────────────────────────┘
//! ```

use crate::command::MAX_VALUES;
use crate::sync::{ShmCondvar, ShmMutex};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Magic number for validation: "IOSRVSHM" in ASCII
pub const SEGMENT_MAGIC: u64 = 0x494F_5352_5653_484D;

/// Bumped whenever the block layout changes
pub const LAYOUT_VERSION: u32 = 1;

/// Offset of the first process-data byte
pub const DATA_OFFSET: usize = std::mem::size_of::<ControlBlock>();

/// Total segment size for a given area size
pub const fn segment_size(area_size: usize) -> usize {
    DATA_OFFSET + 3 * area_size
}

/// Get current timestamp in milliseconds
#[inline]
pub fn timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ========== SegmentHeader ==========

/// Segment header (64 bytes, cache-line aligned)
#[repr(C, align(64))]
pub struct SegmentHeader {
    pub magic: u64,
    pub version: u32,
    /// Bytes per process-data area
    pub area_size: u32,
    /// 0 while the server is still setting up, 1 once attachable
    pub initialized: AtomicU32,
    _pad: u32,
    /// Server liveness timestamp (milliseconds since epoch)
    pub heartbeat_ms: AtomicU64,
    _reserved: [u8; 32],
}

impl SegmentHeader {
    fn new(area_size: u32) -> Self {
        Self {
            magic: SEGMENT_MAGIC,
            version: LAYOUT_VERSION,
            area_size,
            initialized: AtomicU32::new(0),
            _pad: 0,
            heartbeat_ms: AtomicU64::new(timestamp_ms()),
            _reserved: [0; 32],
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire) == 1
    }

    pub fn touch(&self) {
        self.heartbeat_ms.store(timestamp_ms(), Ordering::Release);
    }
}

// ========== Mailbox ==========

/// Command/reply record. Flags are int-sized, nonzero meaning set.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mailbox {
    pub command: i32,
    pub values: [i32; MAX_VALUES],
    pub length: i32,
    pub request_pending: i32,
    pub reply_pending: i32,
}

impl Mailbox {
    pub const fn new() -> Self {
        Self {
            command: 0,
            values: [0; MAX_VALUES],
            length: 0,
            request_pending: 0,
            reply_pending: 0,
        }
    }

    #[inline]
    pub fn request_pending(&self) -> bool {
        self.request_pending != 0
    }

    #[inline]
    pub fn reply_pending(&self) -> bool {
        self.reply_pending != 0
    }

    /// Payload values, or `None` when the stored length is out of bounds
    pub fn payload(&self) -> Option<&[i32]> {
        usize::try_from(self.length)
            .ok()
            .and_then(|len| self.values.get(..len))
    }

    /// Store a request. Caller guarantees `values.len() <= MAX_VALUES`.
    pub fn post_request(&mut self, command: i32, values: &[i32]) {
        self.command = command;
        self.values = [0; MAX_VALUES];
        self.values[..values.len()].copy_from_slice(values);
        self.length = values.len() as i32;
        self.reply_pending = 0;
        self.request_pending = 1;
    }

    /// Replace the request with its reply: command echoed, code in `values[0]`.
    /// The request flag is cleared before the reply flag is raised.
    pub fn post_reply(&mut self, command: i32, code: i32) {
        self.command = command;
        self.values = [0; MAX_VALUES];
        self.values[0] = code;
        self.length = 1;
        self.request_pending = 0;
        self.reply_pending = 1;
    }

    /// Back to the idle state
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

// ========== ControlBlock ==========

/// Everything in the segment ahead of the process-data bytes
#[repr(C, align(64))]
pub struct ControlBlock {
    pub header: SegmentHeader,
    /// The request lock
    pub mailbox: ShmMutex<Mailbox>,
    pub reply_lock: ShmMutex<()>,
    pub reply_signal: ShmCondvar,
    /// Guards the process-data bytes that follow the block
    pub data_lock: ShmMutex<()>,
}

impl ControlBlock {
    /// Write a fresh block at `ptr` and mark it attachable.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for writes of `size_of::<ControlBlock>()` bytes,
    /// 64-byte aligned, and no other process may be using the block yet.
    pub unsafe fn init(ptr: *mut ControlBlock, area_size: u32) {
        ptr.write(ControlBlock {
            header: SegmentHeader::new(area_size),
            mailbox: ShmMutex::new(Mailbox::new()),
            reply_lock: ShmMutex::new(()),
            reply_signal: ShmCondvar::new(),
            data_lock: ShmMutex::new(()),
        });
        (*ptr).header.initialized.store(1, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        assert_eq!(std::mem::size_of::<SegmentHeader>(), 64);
    }

    #[test]
    fn test_mailbox_wire_size() {
        // command + 100 values + length + two flags, all 4-byte ints
        assert_eq!(std::mem::size_of::<Mailbox>(), 4 * (1 + MAX_VALUES + 1 + 2));
    }

    #[test]
    fn test_data_offset_aligned() {
        assert_eq!(DATA_OFFSET % 64, 0);
        assert_eq!(segment_size(10), DATA_OFFSET + 30);
    }

    #[test]
    fn test_payload_bounds() {
        let mut mb = Mailbox::new();
        mb.post_request(3, &[2, 5, 3]);
        assert_eq!(mb.payload(), Some(&[2, 5, 3][..]));
        mb.length = -1;
        assert_eq!(mb.payload(), None);
        mb.length = MAX_VALUES as i32 + 1;
        assert_eq!(mb.payload(), None);
    }

    #[test]
    fn test_reply_clears_request_flag() {
        let mut mb = Mailbox::new();
        mb.post_request(2, &[]);
        assert!(mb.request_pending() && !mb.reply_pending());
        mb.post_reply(2, 1);
        assert!(!mb.request_pending() && mb.reply_pending());
        assert_eq!(mb.payload(), Some(&[1][..]));
    }
}
