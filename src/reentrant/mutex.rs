use core::fmt::{self, Debug, Display, Formatter};
use core::marker::PhantomData;
use core::ops::Deref;

use crate::park::{ImmediatePark, Park};
use crate::raw::RawLock;

#[cfg(test)]
use crate::test::{LockNew, LockThen, TryLockThen};

/// A reentrant mutual exclusion primitive useful for protecting shared data.
///
/// The lock may be acquired multiple times by the same thread without
/// deadlocking itself, every RAII guard holds one level of it. Since several
/// guards of the same thread may be alive at once, guards only give shared
/// access to the protected data. Use interior mutability (e.g. [`Cell`] or
/// [`RefCell`]) to mutate it.
///
/// Threads that find the lock held by another thread are queued and parked
/// according to the `P` parking policy, see [`RawLock`] for the protocol and
/// its fairness modes.
///
/// # Examples
///
/// ```
/// use std::cell::Cell;
/// use std::sync::Arc;
/// use std::thread;
///
/// use clhlock::reentrant::parks::ReentrantMutex;
///
/// const N: usize = 10;
///
/// let data = Arc::new(ReentrantMutex::new(Cell::new(0)));
///
/// let handles: Vec<_> = (0..N)
///     .map(|_| {
///         let data = Arc::clone(&data);
///         thread::spawn(move || {
///             let outer = data.lock();
///             // The owner can lock again without deadlocking.
///             let inner = data.lock();
///             inner.set(outer.get() + 1);
///         })
///     })
///     .collect();
///
/// for handle in handles {
///     handle.join().unwrap();
/// }
/// assert_eq!(data.lock().get(), N);
/// ```
/// [`Cell`]: core::cell::Cell
/// [`RefCell`]: core::cell::RefCell
pub struct ReentrantMutex<T: ?Sized, P = ImmediatePark> {
    raw: RawLock<P>,
    data: T,
}

// SAFETY: Only the owning thread ever gets a reference to the protected data,
// so sharing the mutex is only as demanding as sending `T` to that thread.
unsafe impl<T: ?Sized + Send, P> Sync for ReentrantMutex<T, P> {}

impl<T, P> ReentrantMutex<T, P> {
    /// Creates a new, non-fair mutex in an unlocked state ready for use.
    ///
    /// # Examples
    ///
    /// ```
    /// use clhlock::reentrant::parks::ReentrantMutex;
    ///
    /// static MUTEX: ReentrantMutex<i32> = ReentrantMutex::new(0);
    /// let mutex = ReentrantMutex::new(0);
    /// ```
    #[cfg(not(all(loom, test)))]
    #[inline]
    pub const fn new(value: T) -> Self {
        Self::with_fairness(value, false)
    }

    /// Creates a new, fair mutex in an unlocked state ready for use.
    ///
    /// # Examples
    ///
    /// ```
    /// use clhlock::reentrant::parks::ReentrantMutex;
    ///
    /// let mutex = ReentrantMutex::new_fair(0);
    /// assert!(mutex.is_fair());
    /// ```
    #[cfg(not(all(loom, test)))]
    #[inline]
    pub const fn new_fair(value: T) -> Self {
        Self::with_fairness(value, true)
    }

    /// Creates a new mutex in an unlocked state, fair if `fair` is `true`.
    #[cfg(not(all(loom, test)))]
    #[inline]
    pub const fn with_fairness(value: T, fair: bool) -> Self {
        Self { raw: RawLock::new(fair), data: value }
    }

    /// Creates a new, non-fair mutex with Loom primitives (non-const).
    #[cfg(all(loom, test))]
    #[cfg(not(tarpaulin_include))]
    pub fn new(value: T) -> Self {
        Self::with_fairness(value, false)
    }

    /// Creates a new, fair mutex with Loom primitives (non-const).
    #[cfg(all(loom, test))]
    #[cfg(not(tarpaulin_include))]
    pub fn new_fair(value: T) -> Self {
        Self::with_fairness(value, true)
    }

    /// Creates a new mutex with Loom primitives (non-const).
    #[cfg(all(loom, test))]
    #[cfg(not(tarpaulin_include))]
    pub fn with_fairness(value: T, fair: bool) -> Self {
        Self { raw: RawLock::new(fair), data: value }
    }

    /// Consumes this mutex, returning the underlying data.
    ///
    /// # Examples
    ///
    /// ```
    /// use clhlock::reentrant::parks::ReentrantMutex;
    ///
    /// let mutex = ReentrantMutex::new(0);
    /// assert_eq!(mutex.into_inner(), 0);
    /// ```
    #[inline(always)]
    pub fn into_inner(self) -> T {
        self.data
    }
}

impl<T: ?Sized, P: Park> ReentrantMutex<T, P> {
    /// Acquires this mutex, blocking the current thread until it is able to
    /// do so.
    ///
    /// If the current thread already holds the mutex, this returns a new
    /// guard immediately. The mutex is held until every guard of the owning
    /// thread has been dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::cell::Cell;
    /// use std::sync::Arc;
    /// use std::thread;
    ///
    /// use clhlock::reentrant::parks::ReentrantMutex;
    ///
    /// let mutex = Arc::new(ReentrantMutex::new(Cell::new(0)));
    /// let c_mutex = Arc::clone(&mutex);
    ///
    /// thread::spawn(move || {
    ///     c_mutex.lock().set(10);
    /// })
    /// .join().expect("thread::spawn failed");
    ///
    /// assert_eq!(mutex.lock().get(), 10);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the owner's hold count would overflow.
    #[inline]
    pub fn lock(&self) -> ReentrantMutexGuard<'_, T, P> {
        self.raw.acquire();
        ReentrantMutexGuard::new(self)
    }

    /// Acquires this mutex and then runs the closure against the protected
    /// data.
    ///
    /// The mutex is released (one level) once the closure returns or unwinds.
    ///
    /// # Examples
    ///
    /// ```
    /// use clhlock::reentrant::parks::ReentrantMutex;
    ///
    /// let mutex = ReentrantMutex::new(1);
    /// let sum = mutex.lock_then(|outer| mutex.lock_then(|inner| outer + inner));
    /// assert_eq!(sum, 2);
    /// ```
    ///
    /// Compile fail: borrows of the data cannot escape the given closure:
    ///
    /// ```compile_fail,E0515
    /// use clhlock::reentrant::parks::ReentrantMutex;
    ///
    /// let mutex = ReentrantMutex::new(1);
    /// let borrow = mutex.lock_then(|data| &*data);
    /// ```
    #[inline]
    pub fn lock_then<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(&T) -> Ret,
    {
        f(&self.lock())
    }

    /// Attempts to acquire this mutex without blocking.
    ///
    /// Returns [`None`] if the mutex is held by another thread, or if it is a
    /// fair mutex and other threads are queued for it. The owning thread
    /// always succeeds.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use std::thread;
    ///
    /// use clhlock::reentrant::parks::ReentrantMutex;
    ///
    /// let mutex = Arc::new(ReentrantMutex::new(0));
    /// let c_mutex = Arc::clone(&mutex);
    ///
    /// let guard = mutex.lock();
    /// assert!(mutex.try_lock().is_some());
    ///
    /// let taken = thread::spawn(move || c_mutex.try_lock().is_some());
    /// assert!(!taken.join().unwrap());
    /// drop(guard);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the owner's hold count would overflow.
    #[inline]
    pub fn try_lock(&self) -> Option<ReentrantMutexGuard<'_, T, P>> {
        self.raw.try_acquire().then(|| ReentrantMutexGuard::new(self))
    }

    /// Attempts to acquire this mutex and then runs a closure against the
    /// protected data.
    ///
    /// If the mutex could not be acquired at this time, then [`None`] is
    /// passed to the closure.
    ///
    /// # Examples
    ///
    /// ```
    /// use clhlock::reentrant::parks::ReentrantMutex;
    ///
    /// let mutex = ReentrantMutex::new(7);
    /// let value = mutex.try_lock_then(|data| data.copied());
    /// assert_eq!(value, Some(7));
    /// ```
    #[inline]
    pub fn try_lock_then<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(Option<&T>) -> Ret,
    {
        f(self.try_lock().as_deref())
    }
}

impl<T: ?Sized, P> ReentrantMutex<T, P> {
    /// Returns `true` if the mutex is currently held by any thread.
    ///
    /// This function does not guarantee strong ordering, only atomicity.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// Returns `true` if the mutex is held by the current thread.
    ///
    /// # Examples
    ///
    /// ```
    /// use clhlock::reentrant::parks::ReentrantMutex;
    ///
    /// let mutex = ReentrantMutex::new(0);
    /// let guard = mutex.lock();
    /// assert!(mutex.is_owned_by_current_thread());
    /// drop(guard);
    /// assert!(!mutex.is_owned_by_current_thread());
    /// ```
    #[inline]
    pub fn is_owned_by_current_thread(&self) -> bool {
        self.raw.is_owned_by_current_thread()
    }

    /// Returns `true` if this mutex grants the lock in queue order.
    #[inline]
    pub fn is_fair(&self) -> bool {
        self.raw.is_fair()
    }

    /// Returns a reference to the underlying raw lock.
    #[inline]
    pub fn raw(&self) -> &RawLock<P> {
        &self.raw
    }

    /// Returns a mutable reference to the underlying data.
    ///
    /// Since this call borrows the `ReentrantMutex` mutably, no actual
    /// locking needs to take place - the mutable borrow statically guarantees
    /// no locks exist.
    ///
    /// # Examples
    ///
    /// ```
    /// use clhlock::reentrant::parks::ReentrantMutex;
    ///
    /// let mut mutex = ReentrantMutex::new(0);
    /// *mutex.get_mut() = 10;
    ///
    /// assert_eq!(*mutex.lock(), 10);
    /// ```
    #[inline(always)]
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

impl<T: Default, P> Default for ReentrantMutex<T, P> {
    /// Creates a non-fair `ReentrantMutex<T, P>`, with the `Default` value
    /// for `T`.
    #[inline]
    fn default() -> Self {
        Self::new(Default::default())
    }
}

impl<T, P> From<T> for ReentrantMutex<T, P> {
    /// Creates a non-fair `ReentrantMutex<T, P>` from an instance of `T`.
    #[inline]
    fn from(data: T) -> Self {
        Self::new(data)
    }
}

impl<T: ?Sized + Debug, P: Park> Debug for ReentrantMutex<T, P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("ReentrantMutex");
        match self.try_lock() {
            Some(guard) => d.field("data", &&*guard),
            None => d.field("data", &format_args!("<locked>")),
        };
        d.finish()
    }
}

/// An RAII implementation of a "scoped lock" of a reentrant mutex. When this
/// structure is dropped (falls out of scope), one level of the lock is
/// released.
///
/// The data protected by the mutex can be accessed through this guard via its
/// [`Deref`] implementation. A guard can not be sent to another thread, since
/// only the owning thread may release the lock.
///
/// This structure is returned by [`lock`] and [`try_lock`] methods on
/// [`ReentrantMutex`].
///
/// [`lock`]: ReentrantMutex::lock
/// [`try_lock`]: ReentrantMutex::try_lock
#[must_use = "if unused the ReentrantMutex will immediately unlock"]
pub struct ReentrantMutexGuard<'a, T: ?Sized, P: Park> {
    lock: &'a ReentrantMutex<T, P>,
    // Guards must be dropped on the thread that owns the lock.
    marker: PhantomData<*const ()>,
}

// SAFETY: Sharing a guard only shares a `&T` with other threads.
unsafe impl<T: ?Sized + Sync, P: Park> Sync for ReentrantMutexGuard<'_, T, P> {}

impl<'a, T: ?Sized, P: Park> ReentrantMutexGuard<'a, T, P> {
    /// Creates a new guard, the current thread must hold `lock`.
    const fn new(lock: &'a ReentrantMutex<T, P>) -> Self {
        Self { lock, marker: PhantomData }
    }
}

impl<T: ?Sized, P: Park> Deref for ReentrantMutexGuard<'_, T, P> {
    type Target = T;

    /// Dereferences the guard to access the underlying data.
    #[inline(always)]
    fn deref(&self) -> &T {
        &self.lock.data
    }
}

impl<T: ?Sized + Debug, P: Park> Debug for ReentrantMutexGuard<'_, T, P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&**self, f)
    }
}

impl<T: ?Sized + Display, P: Park> Display for ReentrantMutexGuard<'_, T, P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&**self, f)
    }
}

impl<T: ?Sized, P: Park> Drop for ReentrantMutexGuard<'_, T, P> {
    #[inline]
    fn drop(&mut self) {
        // A guard is only ever alive on the owning thread, with its own hold.
        if let Err(err) = self.lock.raw.release() {
            guard_release_failed(err);
        }
    }
}

#[cold]
fn guard_release_failed(err: crate::ReleaseError) -> ! {
    panic!("reentrant mutex guard failed to release its lock: {err}")
}

#[cfg(test)]
impl<T: ?Sized, P> LockNew for ReentrantMutex<T, P> {
    type Target = T;

    fn new(value: Self::Target) -> Self
    where
        Self::Target: Sized,
    {
        Self::new(value)
    }
}

#[cfg(test)]
impl<T: ?Sized, P: Park> LockThen for ReentrantMutex<T, P> {
    fn lock_then<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(&Self::Target) -> Ret,
    {
        self.lock_then(f)
    }
}

#[cfg(test)]
impl<T: ?Sized, P: Park> TryLockThen for ReentrantMutex<T, P> {
    fn try_lock_then<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(Option<&Self::Target>) -> Ret,
    {
        self.try_lock_then(f)
    }

    fn is_locked(&self) -> bool {
        self.is_locked()
    }
}

#[cfg(all(not(loom), test))]
impl<T: ?Sized, P> crate::test::LockData for ReentrantMutex<T, P> {
    fn into_inner(self) -> Self::Target
    where
        Self::Target: Sized,
    {
        self.into_inner()
    }

    fn get_mut(&mut self) -> &mut Self::Target {
        self.get_mut()
    }
}

/// A fair `ReentrantMutex`, so that the generic test suite also covers the
/// fair acquisition path.
#[cfg(test)]
pub struct FairMutex<T: ?Sized, P = ImmediatePark>(ReentrantMutex<T, P>);

#[cfg(test)]
impl<T: ?Sized, P> LockNew for FairMutex<T, P> {
    type Target = T;

    fn new(value: Self::Target) -> Self
    where
        Self::Target: Sized,
    {
        Self(ReentrantMutex::new_fair(value))
    }
}

#[cfg(test)]
impl<T: ?Sized, P: Park> LockThen for FairMutex<T, P> {
    fn lock_then<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(&Self::Target) -> Ret,
    {
        self.0.lock_then(f)
    }
}

#[cfg(test)]
impl<T: ?Sized, P: Park> TryLockThen for FairMutex<T, P> {
    fn try_lock_then<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(Option<&Self::Target>) -> Ret,
    {
        self.0.try_lock_then(f)
    }

    fn is_locked(&self) -> bool {
        self.0.is_locked()
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use core::cell::Cell;
    use std::sync::Arc;
    use std::thread;

    use crate::park::{ImmediatePark, SpinThenPark, YieldBackoffThenPark};
    use crate::test::tests;

    type ReentrantMutex<T> = super::ReentrantMutex<T, ImmediatePark>;
    type FairMutex<T> = super::FairMutex<T, ImmediatePark>;
    type SpinMutex<T> = super::ReentrantMutex<T, SpinThenPark>;
    type YieldFairMutex<T> = super::FairMutex<T, YieldBackoffThenPark>;

    #[test]
    fn lots_and_lots_lock() {
        tests::lots_and_lots_lock::<ReentrantMutex<_>>();
    }

    #[test]
    fn lots_and_lots_lock_fair() {
        tests::lots_and_lots_lock::<FairMutex<_>>();
    }

    #[test]
    fn lots_and_lots_lock_spins() {
        tests::lots_and_lots_lock::<SpinMutex<_>>();
    }

    #[test]
    fn lots_and_lots_lock_yields_fair() {
        tests::lots_and_lots_lock::<YieldFairMutex<_>>();
    }

    #[test]
    fn lots_and_lots_try_lock() {
        tests::lots_and_lots_try_lock::<ReentrantMutex<_>>();
    }

    #[test]
    fn lots_and_lots_try_lock_fair() {
        tests::lots_and_lots_try_lock::<FairMutex<_>>();
    }

    #[test]
    fn lots_and_lots_mixed_lock() {
        tests::lots_and_lots_mixed_lock::<ReentrantMutex<_>>();
    }

    #[test]
    fn lots_and_lots_mixed_lock_fair() {
        tests::lots_and_lots_mixed_lock::<FairMutex<_>>();
    }

    #[test]
    fn lots_and_lots_nested_lock() {
        tests::lots_and_lots_nested_lock::<ReentrantMutex<_>>();
    }

    #[test]
    fn lots_and_lots_nested_lock_fair() {
        tests::lots_and_lots_nested_lock::<FairMutex<_>>();
    }

    #[test]
    fn smoke() {
        tests::smoke::<ReentrantMutex<_>>();
        tests::smoke::<FairMutex<_>>();
    }

    #[test]
    fn reentrant_smoke() {
        tests::reentrant_smoke::<ReentrantMutex<_>>();
        tests::reentrant_smoke::<FairMutex<_>>();
    }

    #[test]
    fn test_mutex_debug() {
        tests::test_mutex_debug::<ReentrantMutex<_>>();
    }

    #[test]
    fn test_mutex_default() {
        tests::test_mutex_default::<ReentrantMutex<_>>();
    }

    #[test]
    fn test_mutex_from() {
        tests::test_mutex_from::<ReentrantMutex<_>>();
    }

    #[test]
    fn test_try_lock() {
        tests::test_try_lock::<ReentrantMutex<_>>();
        tests::test_try_lock::<FairMutex<_>>();
    }

    #[test]
    fn test_into_inner() {
        tests::test_into_inner::<ReentrantMutex<_>>();
    }

    #[test]
    fn test_into_inner_drop() {
        tests::test_into_inner_drop::<ReentrantMutex<_>>();
    }

    #[test]
    fn test_get_mut() {
        tests::test_get_mut::<ReentrantMutex<_>>();
    }

    #[test]
    fn test_lock_arc_nested() {
        tests::test_lock_arc_nested::<ReentrantMutex<_>, ReentrantMutex<_>>();
    }

    #[test]
    fn test_acquire_more_than_one_lock() {
        tests::test_acquire_more_than_one_lock::<ReentrantMutex<_>>();
    }

    #[test]
    fn test_lock_arc_access_in_unwind() {
        tests::test_lock_arc_access_in_unwind::<ReentrantMutex<_>>();
        tests::test_lock_arc_access_in_unwind::<FairMutex<_>>();
    }

    #[test]
    fn test_guard_debug_display() {
        let value = 42;
        let mutex = ReentrantMutex::new(value);
        let guard = mutex.lock();
        assert_eq!(format!("{value:?}"), format!("{guard:?}"));
        assert_eq!(format!("{value}"), format!("{guard}"));
    }

    #[test]
    fn test_lock_unsized() {
        let mutex: &ReentrantMutex<[Cell<u32>]> = &ReentrantMutex::new([Cell::new(1), Cell::new(2)]);
        let guard = mutex.lock();
        guard[0].set(4);
        assert_eq!(mutex.lock()[0].get(), 4);
        drop(guard);
        assert!(!mutex.is_locked());
    }

    #[test]
    #[should_panic(expected = "failed to release its lock: lock is not owned")]
    fn guard_drop_without_hold_panics() {
        let mutex = ReentrantMutex::new(0);
        let guard = mutex.lock();
        // Steal the level held by `guard` through the raw lock.
        mutex.raw().release().unwrap();
        drop(guard);
    }

    #[test]
    fn guards_release_one_level_each() {
        let mutex = Arc::new(ReentrantMutex::new(()));
        let first = mutex.lock();
        let second = mutex.lock();
        assert_eq!(mutex.raw().hold_count(), 2);
        drop(first);
        assert!(mutex.is_owned_by_current_thread());
        drop(second);
        assert!(!mutex.is_locked());

        let c_mutex = Arc::clone(&mutex);
        let taken = thread::spawn(move || c_mutex.try_lock().is_some());
        assert!(taken.join().unwrap());
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::park::ImmediatePark;

    type ReentrantMutex<T> = super::ReentrantMutex<T, ImmediatePark>;
    type FairMutex<T> = super::FairMutex<T, ImmediatePark>;

    #[test]
    fn try_lock_join() {
        models::try_lock_join::<ReentrantMutex<_>>();
    }

    #[test]
    fn try_lock_join_fair() {
        models::try_lock_join::<FairMutex<_>>();
    }

    #[test]
    fn lock_join() {
        models::lock_join::<ReentrantMutex<_>>();
    }

    #[test]
    fn lock_join_fair() {
        models::lock_join::<FairMutex<_>>();
    }

    #[test]
    fn mixed_lock_join() {
        models::mixed_lock_join::<ReentrantMutex<_>>();
    }

    #[test]
    fn mixed_lock_join_fair() {
        models::mixed_lock_join::<FairMutex<_>>();
    }

    #[test]
    fn nested_lock_join() {
        models::nested_lock_join::<ReentrantMutex<_>>();
    }

    #[test]
    fn nested_lock_join_fair() {
        models::nested_lock_join::<FairMutex<_>>();
    }
}
