//! Locking interfaces for the queue lock that are compatible with [lock_api].
//!
//! This module exports [`lock_api::Mutex`] and [`lock_api::ReentrantMutex`]
//! type aliases (and their guards) with [`RawLock`] as their raw lock. The
//! [`RawLock`] type implements the [`lock_api::RawMutex`] trait when this
//! feature is enabled.
//!
//! Through the [`lock_api::RawMutex`] interface the lock is *not* reentrant:
//! [`lock_api::Mutex`] hands out exclusive references, so the owning thread
//! locking it again would alias them. Such a call panics instead of
//! deadlocking. Reentrancy is provided by [`lock_api::ReentrantMutex`], which
//! keeps its own owner and count on top of the raw lock, using
//! [`RawContextId`] to identify threads.
//!
//! The lock is generic over the parking policy. The following modules provide
//! aliases associated with one of the policies of the [`park`] module.
//!
//! [lock_api]: https://crates.io/crates/lock_api
//! [`park`]: crate::park
//! [`lock_api::Mutex`]: https://docs.rs/lock_api/latest/lock_api/struct.Mutex.html
//! [`lock_api::ReentrantMutex`]: https://docs.rs/lock_api/latest/lock_api/struct.ReentrantMutex.html
//! [`lock_api::RawMutex`]: https://docs.rs/lock_api/latest/lock_api/trait.RawMutex.html

use core::num::NonZeroUsize;

use crate::context::ContextId;
use crate::park::{ImmediatePark, Park};
use crate::raw::RawLock;

unsafe impl<P: Park> lock_api::RawMutex for RawLock<P> {
    // Only the owning thread may release the lock.
    type GuardMarker = lock_api::GuardNoSend;

    // A fresh lock holds no queue records, each `INIT` copy is independent.
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::non_fair();

    /// # Panics
    ///
    /// Panics if the calling thread already holds this lock.
    #[inline]
    fn lock(&self) {
        if self.is_owned_by_current_thread() {
            relock();
        }
        self.acquire();
    }

    #[inline]
    fn try_lock(&self) -> bool {
        !self.is_owned_by_current_thread() && self.try_acquire()
    }

    #[inline]
    unsafe fn unlock(&self) {
        if let Err(err) = self.release() {
            unlock_failed(err);
        }
    }

    #[inline]
    fn is_locked(&self) -> bool {
        RawLock::is_locked(self)
    }
}

/// Thread identities for [`lock_api::ReentrantMutex`], backed by the same
/// [`ContextId`] that [`RawLock`] records as its owner.
///
/// [`lock_api::ReentrantMutex`]: https://docs.rs/lock_api/latest/lock_api/struct.ReentrantMutex.html
#[derive(Debug, Clone, Copy, Default)]
pub struct RawContextId;

unsafe impl lock_api::GetThreadId for RawContextId {
    const INIT: Self = Self;

    #[inline]
    fn nonzero_thread_id(&self) -> NonZeroUsize {
        ContextId::current().get()
    }
}

/// A lock that provides mutually exclusive data access that is compatible
/// with [`lock_api`](https://crates.io/crates/lock_api).
pub type Mutex<T, P = ImmediatePark> = lock_api::Mutex<RawLock<P>, T>;

/// A guard that provides mutable data access that is compatible with
/// [`lock_api`](https://crates.io/crates/lock_api).
pub type MutexGuard<'a, T, P = ImmediatePark> = lock_api::MutexGuard<'a, RawLock<P>, T>;

/// A reentrant lock that is compatible with
/// [`lock_api`](https://crates.io/crates/lock_api).
pub type ReentrantMutex<T, P = ImmediatePark> =
    lock_api::ReentrantMutex<RawLock<P>, RawContextId, T>;

/// A guard that provides shared data access to a [`ReentrantMutex`].
pub type ReentrantMutexGuard<'a, T, P = ImmediatePark> =
    lock_api::ReentrantMutexGuard<'a, RawLock<P>, RawContextId, T>;

/// Aliases that implement a `spin then park` parking policy.
pub mod spins {
    use crate::park::SpinThenPark;

    /// A [`lock_api::Mutex`] with the [`SpinThenPark`] policy.
    ///
    /// # Example
    ///
    /// ```
    /// use clhlock::lock_api::spins::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// *mutex.lock() += 1;
    /// assert_eq!(*mutex.lock(), 1);
    /// ```
    /// [`lock_api::Mutex`]: super::Mutex
    pub type Mutex<T> = super::Mutex<T, SpinThenPark>;

    /// A [`lock_api::MutexGuard`] with the [`SpinThenPark`] policy.
    ///
    /// [`lock_api::MutexGuard`]: super::MutexGuard
    pub type MutexGuard<'a, T> = super::MutexGuard<'a, T, SpinThenPark>;

    /// A [`lock_api::ReentrantMutex`] with the [`SpinThenPark`] policy.
    ///
    /// [`lock_api::ReentrantMutex`]: super::ReentrantMutex
    pub type ReentrantMutex<T> = super::ReentrantMutex<T, SpinThenPark>;

    /// A [`lock_api::ReentrantMutexGuard`] with the [`SpinThenPark`] policy.
    ///
    /// [`lock_api::ReentrantMutexGuard`]: super::ReentrantMutexGuard
    pub type ReentrantMutexGuard<'a, T> = super::ReentrantMutexGuard<'a, T, SpinThenPark>;
}

/// Aliases that implement a `yield then park` parking policy.
pub mod yields {
    use crate::park::YieldThenPark;

    /// A [`lock_api::Mutex`] with the [`YieldThenPark`] policy.
    ///
    /// # Example
    ///
    /// ```
    /// use clhlock::lock_api::yields::ReentrantMutex;
    ///
    /// let mutex = ReentrantMutex::new(0);
    /// let outer = mutex.lock();
    /// let inner = mutex.lock();
    /// assert_eq!(*outer + *inner, 0);
    /// ```
    /// [`lock_api::Mutex`]: super::Mutex
    pub type Mutex<T> = super::Mutex<T, YieldThenPark>;

    /// A [`lock_api::MutexGuard`] with the [`YieldThenPark`] policy.
    ///
    /// [`lock_api::MutexGuard`]: super::MutexGuard
    pub type MutexGuard<'a, T> = super::MutexGuard<'a, T, YieldThenPark>;

    /// A [`lock_api::ReentrantMutex`] with the [`YieldThenPark`] policy.
    ///
    /// [`lock_api::ReentrantMutex`]: super::ReentrantMutex
    pub type ReentrantMutex<T> = super::ReentrantMutex<T, YieldThenPark>;

    /// A [`lock_api::ReentrantMutexGuard`] with the [`YieldThenPark`] policy.
    ///
    /// [`lock_api::ReentrantMutexGuard`]: super::ReentrantMutexGuard
    pub type ReentrantMutexGuard<'a, T> = super::ReentrantMutexGuard<'a, T, YieldThenPark>;
}

#[cold]
fn unlock_failed(err: crate::ReleaseError) -> ! {
    panic!("lock_api::RawMutex::unlock failed: {err}")
}

#[cold]
fn relock() -> ! {
    panic!("lock_api::RawMutex::lock called by the thread holding the lock")
}
