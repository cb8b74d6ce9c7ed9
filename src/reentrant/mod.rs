//! A reentrant mutex that owns the data it protects.
//!
//! A [`ReentrantMutex`] pairs a [`RawLock`] with the value it protects and
//! hands out RAII [`ReentrantMutexGuard`]s. The owning thread may lock it any
//! number of times, each guard releases one level of the lock when dropped.
//! Because several guards may be alive at once on the owning thread, guards
//! only dereference to a shared `&T`.
//!
//! The mutex is generic over the parking policy. Users may choose a policy as
//! long as it implements the [`Park`] trait. The following modules provide
//! type aliases for [`ReentrantMutex`] associated with one of the policies of
//! the [`park`] module. See their documentation for more information.
//!
//! [`RawLock`]: crate::RawLock
//! [`park`]: crate::park
//! [`Park`]: crate::park::Park

mod mutex;
pub use mutex::{ReentrantMutex, ReentrantMutexGuard};

/// A reentrant mutex that implements an `immediate park` parking policy.
///
/// During lock contention, this lock will immediately put the thread to sleep.
pub mod parks {
    use super::mutex;
    use crate::park::ImmediatePark;

    /// A [`reentrant::ReentrantMutex`] that implements the [`ImmediatePark`]
    /// parking policy.
    ///
    /// # Example
    ///
    /// ```
    /// use clhlock::reentrant::parks::ReentrantMutex;
    ///
    /// let mutex = ReentrantMutex::new(0);
    /// let value = mutex.lock_then(|outer| mutex.lock_then(|inner| outer + inner));
    /// assert_eq!(value, 0);
    /// ```
    /// [`reentrant::ReentrantMutex`]: mutex::ReentrantMutex
    pub type ReentrantMutex<T> = mutex::ReentrantMutex<T, ImmediatePark>;

    /// A [`reentrant::ReentrantMutexGuard`] that implements the
    /// [`ImmediatePark`] parking policy.
    ///
    /// [`reentrant::ReentrantMutexGuard`]: mutex::ReentrantMutexGuard
    pub type ReentrantMutexGuard<'a, T> = mutex::ReentrantMutexGuard<'a, T, ImmediatePark>;
}

/// A reentrant mutex that implements a `spin then park` parking policy.
///
/// During lock contention, and for a certain amount of attempts, this lock
/// spins while signaling the processor that it is running a busy-wait
/// spin-loop. Once all attempts have been tried, puts the thread to sleep.
pub mod spins {
    use super::mutex;
    use crate::park::SpinThenPark;

    /// A [`reentrant::ReentrantMutex`] that implements the [`SpinThenPark`]
    /// parking policy.
    ///
    /// # Example
    ///
    /// ```
    /// use clhlock::reentrant::spins::ReentrantMutex;
    ///
    /// let mutex = ReentrantMutex::new(0);
    /// let value = mutex.lock_then(|data| *data);
    /// assert_eq!(value, 0);
    /// ```
    /// [`reentrant::ReentrantMutex`]: mutex::ReentrantMutex
    pub type ReentrantMutex<T> = mutex::ReentrantMutex<T, SpinThenPark>;

    /// A [`reentrant::ReentrantMutexGuard`] that implements the
    /// [`SpinThenPark`] parking policy.
    ///
    /// [`reentrant::ReentrantMutexGuard`]: mutex::ReentrantMutexGuard
    pub type ReentrantMutexGuard<'a, T> = mutex::ReentrantMutexGuard<'a, T, SpinThenPark>;

    /// A reentrant mutex that implements a `spin with backoff then park`
    /// policy.
    ///
    /// During lock contention, and for a certain amount of attempts, this lock
    /// will perform exponential backoff spinning, signaling the processor that
    /// it is running a busy-wait spin-loop. Once all attempts have been tried,
    /// puts the thread to sleep.
    pub mod backoff {
        use super::mutex;
        use crate::park::SpinBackoffThenPark;

        /// A [`reentrant::ReentrantMutex`] that implements the
        /// [`SpinBackoffThenPark`] parking policy.
        ///
        /// # Example
        ///
        /// ```
        /// use clhlock::reentrant::spins::backoff::ReentrantMutex;
        ///
        /// let mutex = ReentrantMutex::new(0);
        /// let value = mutex.lock_then(|data| *data);
        /// assert_eq!(value, 0);
        /// ```
        /// [`reentrant::ReentrantMutex`]: mutex::ReentrantMutex
        pub type ReentrantMutex<T> = mutex::ReentrantMutex<T, SpinBackoffThenPark>;

        /// A [`reentrant::ReentrantMutexGuard`] that implements the
        /// [`SpinBackoffThenPark`] parking policy.
        ///
        /// [`reentrant::ReentrantMutexGuard`]: mutex::ReentrantMutexGuard
        pub type ReentrantMutexGuard<'a, T> =
            mutex::ReentrantMutexGuard<'a, T, SpinBackoffThenPark>;
    }
}

/// A reentrant mutex that implements a `yield then park` parking policy.
///
/// During lock contention, and for a certain amount of attempts, this lock
/// will yield the current time slice to the OS scheduler. Once all attempts
/// have been tried, puts the thread to sleep.
pub mod yields {
    use super::mutex;
    use crate::park::YieldThenPark;

    /// A [`reentrant::ReentrantMutex`] that implements the [`YieldThenPark`]
    /// parking policy.
    ///
    /// # Example
    ///
    /// ```
    /// use clhlock::reentrant::yields::ReentrantMutex;
    ///
    /// let mutex = ReentrantMutex::new(0);
    /// let value = mutex.lock_then(|data| *data);
    /// assert_eq!(value, 0);
    /// ```
    /// [`reentrant::ReentrantMutex`]: mutex::ReentrantMutex
    pub type ReentrantMutex<T> = mutex::ReentrantMutex<T, YieldThenPark>;

    /// A [`reentrant::ReentrantMutexGuard`] that implements the
    /// [`YieldThenPark`] parking policy.
    ///
    /// [`reentrant::ReentrantMutexGuard`]: mutex::ReentrantMutexGuard
    pub type ReentrantMutexGuard<'a, T> = mutex::ReentrantMutexGuard<'a, T, YieldThenPark>;

    /// A reentrant mutex that implements a `yield with backoff then park`
    /// parking policy.
    ///
    /// During lock contention, and for a certain amount of attempts, this lock
    /// will perform exponential backoff while spinning, up to a threshold,
    /// then yields back to the OS scheduler. Once all attempts have been
    /// tried, it will then put the thread to sleep.
    pub mod backoff {
        use super::mutex;
        use crate::park::YieldBackoffThenPark;

        /// A [`reentrant::ReentrantMutex`] that implements the
        /// [`YieldBackoffThenPark`] parking policy.
        ///
        /// # Example
        ///
        /// ```
        /// use clhlock::reentrant::yields::backoff::ReentrantMutex;
        ///
        /// let mutex = ReentrantMutex::new(0);
        /// let value = mutex.lock_then(|data| *data);
        /// assert_eq!(value, 0);
        /// ```
        /// [`reentrant::ReentrantMutex`]: mutex::ReentrantMutex
        pub type ReentrantMutex<T> = mutex::ReentrantMutex<T, YieldBackoffThenPark>;

        /// A [`reentrant::ReentrantMutexGuard`] that implements the
        /// [`YieldBackoffThenPark`] parking policy.
        ///
        /// [`reentrant::ReentrantMutexGuard`]: mutex::ReentrantMutexGuard
        pub type ReentrantMutexGuard<'a, T> =
            mutex::ReentrantMutexGuard<'a, T, YieldBackoffThenPark>;
    }
}
