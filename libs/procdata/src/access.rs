//! Owner / borrowed-access split over one lock-guarded value
//!
//! A [`Container`] owns the data. Any number of [`Access`] handles can be
//! minted from it; a handle never owns the data, it only carries the right to
//! momentarily hold the lock. Once the container is dropped every handle
//! reports `NotInitialized`.

use errors::{DriverError, DriverResult, TransportError};
use parking_lot::{Mutex, RawMutex};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Guard returned by [`Access`]; keeps the value alive while held
pub type AccessGuard<T> = parking_lot::ArcMutexGuard<RawMutex, T>;

/// Exclusive owner of a lock-guarded value
#[derive(Debug)]
pub struct Container<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Container<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    /// Mint a new borrowed handle
    pub fn access(&self) -> Access<T> {
        Access {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Lock directly through the owner
    pub fn lock(&self) -> parking_lot::MutexGuard<'_, T> {
        self.inner.lock()
    }

    /// Number of live handles minted from this container
    pub fn handle_count(&self) -> usize {
        Arc::weak_count(&self.inner)
    }
}

impl<T: Default> Default for Container<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Borrowed handle granting lock access to a [`Container`]'s value
#[derive(Debug)]
pub struct Access<T> {
    inner: Weak<Mutex<T>>,
}

// Manual impl: cloning a handle must not require `T: Clone`
impl<T> Clone for Access<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Access<T> {
    fn upgrade(&self) -> DriverResult<Arc<Mutex<T>>> {
        self.inner
            .upgrade()
            .ok_or_else(|| DriverError::not_initialized("container has been dropped"))
    }

    /// Block until the lock is held
    pub fn lock(&self) -> DriverResult<AccessGuard<T>> {
        Ok(self.upgrade()?.lock_arc())
    }

    /// Take the lock only if it is free right now
    pub fn try_lock(&self) -> DriverResult<Option<AccessGuard<T>>> {
        Ok(self.upgrade()?.try_lock_arc())
    }

    /// Block for at most `timeout`
    pub fn lock_timeout(&self, timeout: Duration) -> DriverResult<AccessGuard<T>> {
        self.upgrade()?
            .try_lock_arc_for(timeout)
            .ok_or_else(|| TransportError::LockTimeout(timeout).into())
    }

    /// True while the owning container is alive
    pub fn is_valid(&self) -> bool {
        self.inner.strong_count() > 0
    }
}
