//! The lock module.
//!
//! Two wrappers over the same primitive with different contracts. On the
//! single-processor cooperative kernel this core targets, no two kernel
//! threads run simultaneously, so "spinning" never actually spins; the
//! distinction is about what the holder may do:
//!
//!   + `SpinLock` protects short critical sections that never suspend.
//!   + `SleepLock` guards operations that may block through the page
//!     cache (vnode mutexes, the filesystem free-list mutex). Threads
//!     that would contend park on a `hal::WaitQueue` owned by the user
//!     of the lock, not here.

use core::fmt;

pub use spin::MutexGuard as SpinLockGuard;
pub use spin::MutexGuard as SleepLockGuard;

pub struct SpinLock<T> {
    inner: spin::Mutex<T>,
}

impl<T> SpinLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            inner: spin::Mutex::new(data),
        }
    }

    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        self.inner.lock()
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T: fmt::Debug> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLock").finish_non_exhaustive()
    }
}

pub struct SleepLock<T> {
    inner: spin::Mutex<T>,
}

impl<T> SleepLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            inner: spin::Mutex::new(data),
        }
    }

    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        self.inner.lock()
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}
