//! Memory-mapped segment file: creation, attachment and validation

use crate::layout::{self, ControlBlock, DATA_OFFSET, LAYOUT_VERSION, SEGMENT_MAGIC};
use errors::{DriverError, DriverResult};
use memmap2::{MmapMut, MmapOptions};
use procdata::ProcessDataView;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, info};

/// A segment whose heartbeat is younger than this belongs to a running server
pub const LIVE_HEARTBEAT: Duration = Duration::from_secs(2);

/// A mapped segment, either freshly created or attached to
pub struct Segment {
    mmap: MmapMut,
    base: *mut u8,
    area_size: usize,
    path: PathBuf,
}

// Safety: the mapping is shared memory; every access to it goes through the
// process-shared locks in `ControlBlock`.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Create (or truncate) the segment file and initialize the block.
    ///
    /// Only the server calls this. A valid segment with a live heartbeat is
    /// left alone and reported as an error; a stale one is reclaimed.
    pub fn create(path: &Path, area_size: usize) -> DriverResult<Self> {
        let area_size_u32 = u32::try_from(area_size)
            .ok()
            .filter(|size| *size > 0)
            .ok_or_else(|| DriverError::config(format!("invalid area size {area_size}")))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DriverError::segment(format!("failed to create directory {parent:?}: {e}"))
            })?;
        }

        if let Ok(existing) = Self::attach(path) {
            let age = existing.heartbeat_age_ms();
            if u128::from(age) < LIVE_HEARTBEAT.as_millis() {
                return Err(DriverError::segment(format!(
                    "{path:?} belongs to a running server (heartbeat {age} ms ago)"
                )));
            }
            info!("Reclaiming stale shm segment {:?} (heartbeat {} ms ago)", path, age);
        }

        let total_size = layout::segment_size(area_size);
        info!("Creating shm segment: {} bytes at {:?}", total_size, path);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| DriverError::segment(format!("failed to open {path:?}: {e}")))?;
        file.set_len(total_size as u64)
            .map_err(|e| DriverError::segment(format!("failed to size {path:?}: {e}")))?;

        let mut mmap = unsafe {
            MmapOptions::new()
                .map_mut(&file)
                .map_err(|e| DriverError::segment(format!("failed to map {path:?}: {e}")))?
        };
        let base = mmap.as_mut_ptr();
        check_alignment(base)?;

        // Safety: fresh mapping of the right size, page aligned, and nobody
        // can attach before `initialized` is raised at the end of `init`.
        unsafe { ControlBlock::init(base.cast::<ControlBlock>(), area_size_u32) };
        debug!("Shm control block initialized, data offset {}", DATA_OFFSET);

        Ok(Self {
            mmap,
            base,
            area_size,
            path: path.to_path_buf(),
        })
    }

    /// Map an existing segment created by a server
    pub fn attach(path: &Path) -> DriverResult<Self> {
        if !path.exists() {
            return Err(DriverError::not_initialized(format!(
                "shared memory segment {path:?} does not exist"
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| DriverError::segment(format!("failed to open {path:?}: {e}")))?;
        let file_len = file
            .metadata()
            .map_err(|e| DriverError::segment(format!("failed to stat {path:?}: {e}")))?
            .len() as usize;
        if file_len < DATA_OFFSET {
            return Err(DriverError::segment(format!(
                "segment {path:?} is {file_len} bytes, smaller than its header"
            )));
        }

        let mut mmap = unsafe {
            MmapOptions::new()
                .map_mut(&file)
                .map_err(|e| DriverError::segment(format!("failed to map {path:?}: {e}")))?
        };
        let base = mmap.as_mut_ptr();
        check_alignment(base)?;

        // Safety: length checked above, alignment checked, header fields
        // other than atomics are immutable after init.
        let header = unsafe { &(*base.cast::<ControlBlock>()).header };
        if header.magic != SEGMENT_MAGIC {
            return Err(DriverError::segment(format!(
                "bad magic {:#018x} in {path:?}",
                header.magic
            )));
        }
        if header.version != LAYOUT_VERSION {
            return Err(DriverError::segment(format!(
                "layout version {} in {path:?}, expected {LAYOUT_VERSION}",
                header.version
            )));
        }
        if !header.is_initialized() {
            return Err(DriverError::not_initialized(format!(
                "segment {path:?} is still being initialized"
            )));
        }
        let area_size = header.area_size as usize;
        if layout::segment_size(area_size) != file_len {
            return Err(DriverError::segment(format!(
                "segment {path:?} is {file_len} bytes, area size {area_size} needs {}",
                layout::segment_size(area_size)
            )));
        }

        info!(
            "Attached shm segment {:?}, area size {} bytes",
            path, area_size
        );

        Ok(Self {
            mmap,
            base,
            area_size,
            path: path.to_path_buf(),
        })
    }

    #[inline]
    pub fn block(&self) -> &ControlBlock {
        // Safety: validated in create/attach; the block only holds atomics,
        // lock-guarded cells and immutable header fields.
        unsafe { &*self.base.cast::<ControlBlock>() }
    }

    #[inline]
    pub fn area_size(&self) -> usize {
        self.area_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Run `f` on the process-data mirror while holding the data lock
    pub fn with_data<R>(
        &self,
        lock_timeout: Duration,
        f: impl FnOnce(&mut ProcessDataView<'_>) -> R,
    ) -> DriverResult<R> {
        let _guard = self.block().data_lock.lock_timeout(lock_timeout)?;
        // Safety: the data lock is held for the lifetime of the slice and the
        // region lies entirely inside the mapping.
        let bytes = unsafe {
            std::slice::from_raw_parts_mut(self.base.add(DATA_OFFSET), 3 * self.area_size)
        };
        let mut view = ProcessDataView::new(bytes, self.area_size)?;
        Ok(f(&mut view))
    }

    /// Milliseconds since the server last refreshed its heartbeat
    pub fn heartbeat_age_ms(&self) -> u64 {
        let beat = self.block().header.heartbeat_ms.load(Ordering::Acquire);
        layout::timestamp_ms().saturating_sub(beat)
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("path", &self.path)
            .field("area_size", &self.area_size)
            .field("len", &self.mmap.len())
            .finish()
    }
}

fn check_alignment(base: *mut u8) -> DriverResult<()> {
    if (base as usize) % std::mem::align_of::<ControlBlock>() != 0 {
        return Err(DriverError::segment("mapping is not 64-byte aligned"));
    }
    Ok(())
}
