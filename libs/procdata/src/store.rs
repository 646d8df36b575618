//! Fixed-size process-data byte regions
//!
//! [`ProcessData`] owns three equally sized byte regions (input, output,
//! memory). [`ProcessDataView`] borrows the same geometry out of one
//! contiguous buffer, which is how the shared-memory mirror is laid out.

use crate::area::Area;
use crate::image::ProcessImage;
use errors::{DriverError, DriverResult};

/// Bytes per area in the reference configuration
pub const DEFAULT_AREA_SIZE: usize = 5000;

/// Owned process image, sized once at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessData {
    regions: [Box<[u8]>; 3],
}

impl ProcessData {
    /// Create a zeroed image with `area_size` bytes per area
    pub fn new(area_size: usize) -> Self {
        Self {
            regions: [
                vec![0u8; area_size].into_boxed_slice(),
                vec![0u8; area_size].into_boxed_slice(),
                vec![0u8; area_size].into_boxed_slice(),
            ],
        }
    }

    #[inline]
    pub fn area_size(&self) -> usize {
        self.regions[0].len()
    }

    #[inline]
    pub fn area(&self, area: Area) -> &[u8] {
        &self.regions[area.index()]
    }

    #[inline]
    pub fn area_mut(&mut self, area: Area) -> &mut [u8] {
        &mut self.regions[area.index()]
    }

    /// Replace the whole image with `other`. Geometry must match.
    pub fn copy_from(&mut self, other: &ProcessData) -> DriverResult<()> {
        check_geometry(self.area_size(), other.area_size())?;
        for area in Area::ALL {
            self.area_mut(area).copy_from_slice(other.area(area));
        }
        Ok(())
    }

    /// Zero every area
    pub fn clear(&mut self) {
        for region in &mut self.regions {
            region.fill(0);
        }
    }
}

impl Default for ProcessData {
    fn default() -> Self {
        Self::new(DEFAULT_AREA_SIZE)
    }
}

impl ProcessImage for ProcessData {
    fn areas(&self) -> &[Area] {
        &Area::ALL
    }

    fn byte_count(&self) -> u32 {
        self.area_size() as u32
    }

    fn read_raw(&self, area: Area, offset: usize, buf: &mut [u8]) {
        buf.copy_from_slice(&self.area(area)[offset..offset + buf.len()]);
    }

    fn write_raw(&mut self, area: Area, offset: usize, bytes: &[u8]) {
        self.area_mut(area)[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

// ========== ProcessDataView ==========

/// Process image borrowed from one contiguous `3 * area_size` buffer
/// (input, output, memory in that order)
#[derive(Debug)]
pub struct ProcessDataView<'a> {
    regions: [&'a mut [u8]; 3],
}

impl<'a> ProcessDataView<'a> {
    pub fn new(buf: &'a mut [u8], area_size: usize) -> DriverResult<Self> {
        if buf.len() != area_size * 3 {
            return Err(DriverError::not_initialized(format!(
                "process data buffer is {} bytes, expected {}",
                buf.len(),
                area_size * 3
            )));
        }
        let (input, rest) = buf.split_at_mut(area_size);
        let (output, memory) = rest.split_at_mut(area_size);
        Ok(Self {
            regions: [input, output, memory],
        })
    }

    #[inline]
    pub fn area_size(&self) -> usize {
        self.regions[0].len()
    }

    #[inline]
    pub fn area(&self, area: Area) -> &[u8] {
        self.regions[area.index()]
    }

    /// Copy this view into an owned image of the same geometry
    pub fn copy_to(&self, dst: &mut ProcessData) -> DriverResult<()> {
        check_geometry(dst.area_size(), self.area_size())?;
        for area in Area::ALL {
            dst.area_mut(area).copy_from_slice(self.area(area));
        }
        Ok(())
    }

    /// Overwrite this view from an owned image of the same geometry
    pub fn load_from(&mut self, src: &ProcessData) -> DriverResult<()> {
        check_geometry(self.area_size(), src.area_size())?;
        for area in Area::ALL {
            self.regions[area.index()].copy_from_slice(src.area(area));
        }
        Ok(())
    }
}

impl ProcessImage for ProcessDataView<'_> {
    fn areas(&self) -> &[Area] {
        &Area::ALL
    }

    fn byte_count(&self) -> u32 {
        self.area_size() as u32
    }

    fn read_raw(&self, area: Area, offset: usize, buf: &mut [u8]) {
        buf.copy_from_slice(&self.area(area)[offset..offset + buf.len()]);
    }

    fn write_raw(&mut self, area: Area, offset: usize, bytes: &[u8]) {
        self.regions[area.index()][offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

fn check_geometry(expected: usize, actual: usize) -> DriverResult<()> {
    if expected != actual {
        return Err(DriverError::not_initialized(format!(
            "process image geometry mismatch: {expected} vs {actual} bytes per area"
        )));
    }
    Ok(())
}
