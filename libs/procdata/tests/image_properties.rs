//! Property-style checks over the owned process image
//!
//! Exercises every typed accessor across a spread of offsets, including the
//! last valid window of each area.

// Allow unwrap() in tests for cleaner test code
#![allow(clippy::disallowed_methods)]

use procdata::{Address, Area, DataType, ProcessData, ProcessImage, Value};

const SIZE: usize = 64;

/// Offsets worth probing for a value of `width` bytes
fn offsets(width: u32) -> Vec<u32> {
    let last = SIZE as u32 - width;
    vec![0, 1, 2, 3, 17, last - 1, last]
}

fn sample_values() -> Vec<Value> {
    vec![
        Value::Bit(true),
        Value::Byte(0xA5),
        Value::Word(0xBEEF),
        Value::DWord(0xDEAD_BEEF),
        Value::Int(-123_456),
        Value::Real(-2.5),
    ]
}

/// Image with a recognisable non-zero background in every area
fn patterned() -> ProcessData {
    let mut data = ProcessData::new(SIZE);
    for area in Area::ALL {
        for (i, b) in data.area_mut(area).iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(37).wrapping_add(area.code() as u8);
        }
    }
    data
}

// ============================================================================
// Round trips
// ============================================================================

#[test]
fn test_every_type_round_trips_in_every_area() {
    for value in sample_values() {
        let data_type = value.data_type();
        for area in Area::ALL {
            for byte in offsets(data_type.width()) {
                let mut data = patterned();
                let addr = Address::byte(area, byte);
                data.write_value(addr, value).unwrap();
                assert_eq!(
                    data.get_value(addr, data_type).unwrap(),
                    value,
                    "{data_type:?} at {addr}"
                );
            }
        }
    }
}

#[test]
fn test_every_bit_round_trips() {
    let mut data = ProcessData::new(SIZE);
    for bit in 0..=7 {
        let addr = Address::new(Area::Output, 9, bit);
        data.write_bit(addr, true).unwrap();
        assert!(data.get_bit(addr).unwrap());
        data.write_bit(addr, false).unwrap();
        assert!(!data.get_bit(addr).unwrap());
    }
}

#[test]
fn test_nan_real_keeps_bit_pattern() {
    let mut data = ProcessData::new(SIZE);
    let addr = Address::byte(Area::Memory, 4);
    let nan = f32::from_bits(0x7FC0_0001);
    data.write_real(addr, nan).unwrap();
    assert_eq!(data.get_real(addr).unwrap().to_bits(), 0x7FC0_0001);
    assert_eq!(data.get_dword(addr).unwrap(), 0x7FC0_0001);
}

// ============================================================================
// Overlap safety
// ============================================================================

#[test]
fn test_writes_touch_only_their_window() {
    for value in sample_values() {
        let width = value.data_type().width() as usize;
        for area in Area::ALL {
            for byte in offsets(width as u32) {
                let before = patterned();
                let mut after = before.clone();
                let addr = Address::new(area, byte, 3);
                after.write_value(addr, value).unwrap();

                for other in Area::ALL {
                    for (i, (old, new)) in before
                        .area(other)
                        .iter()
                        .zip(after.area(other))
                        .enumerate()
                    {
                        let inside = other == area && i >= byte as usize && i < byte as usize + width;
                        if !inside {
                            assert_eq!(old, new, "{value:?} at {addr} changed {other} byte {i}");
                        }
                    }
                }
            }
        }
    }
}

#[test]
fn test_byte_after_window_is_preserved() {
    let mut data = ProcessData::new(SIZE);
    data.write_byte(Address::byte(Area::Input, 4), 0x5A).unwrap();
    data.write_dword(Address::byte(Area::Input, 0), 0xFFFF_FFFF).unwrap();
    assert_eq!(data.get_byte(Address::byte(Area::Input, 4)).unwrap(), 0x5A);
    data.write_word(Address::byte(Area::Input, 2), 0).unwrap();
    assert_eq!(data.get_byte(Address::byte(Area::Input, 4)).unwrap(), 0x5A);
}

// ============================================================================
// Bit composition
// ============================================================================

#[test]
fn test_bit_ops_compose() {
    let original = patterned();
    for bit in 0..=7 {
        let addr = Address::new(Area::Memory, 11, bit);

        let mut data = original.clone();
        data.invert_bit(addr).unwrap();
        assert_ne!(data, original);
        data.invert_bit(addr).unwrap();
        assert_eq!(data, original);

        let was_set = original.get_bit(addr).unwrap();
        let mut data = original.clone();
        data.set_bit(addr).unwrap();
        data.set_bit(addr).unwrap();
        assert!(data.get_bit(addr).unwrap());
        data.write_bit(addr, was_set).unwrap();
        assert_eq!(data, original);

        let mut data = original.clone();
        data.reset_bit(addr).unwrap();
        data.reset_bit(addr).unwrap();
        assert!(!data.get_bit(addr).unwrap());
        data.write_bit(addr, was_set).unwrap();
        assert_eq!(data, original);
    }
}

#[test]
fn test_set_bits_across_areas() {
    let before = ProcessData::new(SIZE);
    let mut data = before.clone();
    let addrs = [
        Address::new(Area::Input, 3, 1),
        Address::new(Area::Output, 7, 6),
        Address::new(Area::Input, 3, 4),
    ];
    data.set_bits(&addrs).unwrap();
    assert_eq!(data.get_byte(Address::byte(Area::Input, 3)).unwrap(), 0b0001_0010);
    assert_eq!(data.get_byte(Address::byte(Area::Output, 7)).unwrap(), 0b0100_0000);
    assert_eq!(data.get_bits(&addrs).unwrap(), vec![true, true, true]);
}

// ============================================================================
// Boundaries
// ============================================================================

#[test]
fn test_out_of_range_reads_fail_for_every_type() {
    let data = ProcessData::new(SIZE);
    for data_type in [
        DataType::Bit,
        DataType::Byte,
        DataType::Word,
        DataType::DWord,
        DataType::Int,
        DataType::Real,
    ] {
        let first_bad = SIZE as u32 - data_type.width() + 1;
        let err = data
            .get_value(Address::byte(Area::Output, first_bad), data_type)
            .unwrap_err();
        assert_eq!(err.error_code(), "BYTE_OUT_OF_RANGE");
        assert!(err.is_recoverable());
    }
}

#[test]
fn test_bit_offset_checked_before_byte() {
    let data = ProcessData::new(SIZE);
    let err = data
        .get_bit(Address::new(Area::Input, SIZE as u32, 8))
        .unwrap_err();
    assert_eq!(err.error_code(), "BIT_OUT_OF_RANGE");
}
