//! Process-shared synchronization primitives
//!
//! Both types live inside the memory-mapped segment and are used by two
//! unrelated processes at once, so they can only hold plain atomics and
//! plain data: no pointers, no OS handles. A lock is one `AtomicU32` word
//! taken with compare-and-swap; the condition is a sequence counter that
//! waiters poll with a bounded back-off.
//!
//! # Initialization
//!
//! Neither type may be used before the owning process has written a fresh
//! value into the mapping (see `ControlBlock::init`). Attaching processes
//! never initialize.

use errors::{DriverResult, TransportError};
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

// ========== Backoff ==========

/// Spin, then yield, then sleep in short slices
struct Backoff {
    step: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6;
    const YIELD_LIMIT: u32 = 10;
    const SLEEP: Duration = Duration::from_micros(50);

    fn new() -> Self {
        Self { step: 0 }
    }

    fn snooze(&mut self) {
        if self.step < Self::SPIN_LIMIT {
            for _ in 0..(1u32 << self.step) {
                std::hint::spin_loop();
            }
        } else if self.step < Self::YIELD_LIMIT {
            std::thread::yield_now();
        } else {
            std::thread::sleep(Self::SLEEP);
        }
        self.step = self.step.saturating_add(1);
    }
}

// ========== ShmMutex ==========

/// Exclusive lock usable across processes
#[repr(C)]
pub struct ShmMutex<T> {
    state: AtomicU32,
    data: UnsafeCell<T>,
}

// Safety: access to `data` is only handed out while `state` is LOCKED
unsafe impl<T: Send> Send for ShmMutex<T> {}
unsafe impl<T: Send> Sync for ShmMutex<T> {}

impl<T> ShmMutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            state: AtomicU32::new(UNLOCKED),
            data: UnsafeCell::new(value),
        }
    }

    /// Take the lock only if it is free right now
    pub fn try_lock(&self) -> Option<ShmMutexGuard<'_, T>> {
        self.state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| ShmMutexGuard { mutex: self })
    }

    /// Wait at most `timeout` for the lock.
    ///
    /// A peer that died while holding the lock shows up here as `LockTimeout`.
    pub fn lock_timeout(&self, timeout: Duration) -> DriverResult<ShmMutexGuard<'_, T>> {
        let deadline = Instant::now() + timeout;
        let mut backoff = Backoff::new();
        loop {
            if let Some(guard) = self.try_lock() {
                return Ok(guard);
            }
            if Instant::now() >= deadline {
                return Err(TransportError::LockTimeout(timeout).into());
            }
            backoff.snooze();
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) == LOCKED
    }
}

/// RAII guard; the lock is released on drop
pub struct ShmMutexGuard<'a, T> {
    mutex: &'a ShmMutex<T>,
}

impl<T> Deref for ShmMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the guard proves the lock is held
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for ShmMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: the guard proves the lock is held
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for ShmMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.state.store(UNLOCKED, Ordering::Release);
    }
}

// ========== ShmCondvar ==========

/// Signalling condition usable across processes.
///
/// A waiter samples [`sequence`](Self::sequence) while it still holds the
/// lock that protects the awaited state, then calls
/// [`wait_for`](Self::wait_for) after releasing it. Any notification issued
/// after the sample wakes it, so no signal is lost between the two steps.
#[repr(C)]
pub struct ShmCondvar {
    seq: AtomicU32,
}

impl ShmCondvar {
    pub const fn new() -> Self {
        Self {
            seq: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn sequence(&self) -> u32 {
        self.seq.load(Ordering::Acquire)
    }

    pub fn notify_all(&self) {
        self.seq.fetch_add(1, Ordering::AcqRel);
    }

    /// Wait until a notification newer than `observed` arrives.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub fn wait_for(&self, observed: u32, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut backoff = Backoff::new();
        loop {
            if self.sequence() != observed {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            backoff.snooze();
        }
    }
}

impl Default for ShmCondvar {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use errors::DriverError;

    #[test]
    fn test_try_lock_excludes() {
        let mutex = ShmMutex::new(5u32);
        let guard = mutex.try_lock().unwrap();
        assert!(mutex.is_locked());
        assert!(mutex.try_lock().is_none());
        drop(guard);
        assert!(!mutex.is_locked());
        assert_eq!(*mutex.try_lock().unwrap(), 5);
    }

    #[test]
    fn test_lock_timeout_expires() {
        let mutex = ShmMutex::new(());
        let _held = mutex.try_lock().unwrap();
        let started = Instant::now();
        let err = mutex.lock_timeout(Duration::from_millis(30)).err().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(matches!(
            err,
            DriverError::Transport(TransportError::LockTimeout(_))
        ));
    }

    #[test]
    fn test_mutex_serializes_threads() {
        let mutex = ShmMutex::new(0u64);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..500 {
                        let mut guard = mutex.lock_timeout(Duration::from_secs(5)).unwrap();
                        *guard += 1;
                    }
                });
            }
        });
        assert_eq!(*mutex.try_lock().unwrap(), 2000);
    }

    #[test]
    fn test_condvar_wakes_on_notify() {
        let cv = ShmCondvar::new();
        let observed = cv.sequence();
        std::thread::scope(|s| {
            s.spawn(|| {
                std::thread::sleep(Duration::from_millis(10));
                cv.notify_all();
            });
            assert!(cv.wait_for(observed, Duration::from_secs(5)));
        });
    }

    #[test]
    fn test_condvar_times_out() {
        let cv = ShmCondvar::new();
        assert!(!cv.wait_for(cv.sequence(), Duration::from_millis(20)));
    }

    #[test]
    fn test_condvar_notification_before_wait_is_not_lost() {
        let cv = ShmCondvar::new();
        let observed = cv.sequence();
        cv.notify_all();
        assert!(cv.wait_for(observed, Duration::from_millis(1)));
    }
}
