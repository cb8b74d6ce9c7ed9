//! Thread parking policies that determine the behaviour of a waiting thread
//! once it has been linked into the lock's queue.
//!
//! A queued thread repeatedly checks whether it may take the lock: it must be
//! the successor of the queue head, and the lock must be free. Between two
//! failed checks, the policy decides whether the thread should keep burning
//! its time slice (running the policy's [`Relax`] strategy) or should be put
//! to sleep until the releasing thread wakes it up. Whatever the policy says,
//! the acquisition condition is always re-checked after a relax or a wake.
//!
//! The default policy used across this crate is [`ImmediatePark`], which
//! parks the thread as soon as a single check fails.

use core::marker::PhantomData;

use crate::relax::{Relax, Spin, SpinBackoff, Yield, YieldBackoff};

/// The thread parking waiting policy to be applied when the lock is contended.
///
/// # Example
///
/// ```
/// use clhlock::park::Park;
/// use clhlock::relax::Spin;
/// use clhlock::RawLock;
///
/// #[derive(Default)]
/// struct SpinThenPark(u32);
///
/// impl Park for SpinThenPark {
///     type Relax = Spin;
///
///     fn new() -> Self {
///         Self::default()
///     }
///
///     fn should_park(&self) -> bool {
///         self.0 >= 100
///     }
///
///     fn on_failure(&mut self) {
///         self.0 += 1;
///     }
/// }
///
/// let lock = RawLock::<SpinThenPark>::non_fair();
/// lock.acquire();
/// assert!(lock.release().is_ok());
/// ```
///
/// Implementations should not panic. A thread that unwinds out of the waiting
/// loop leaves its queue node behind, and every thread queued after it will
/// wait forever.
pub trait Park {
    /// The relax operation that should be run during a period of contention.
    ///
    /// It is also run while a freshly promoted queue head waits for the
    /// previous releaser to stop reading the retired head node.
    type Relax: Relax;

    /// Returns the initial value for this parking policy.
    fn new() -> Self;

    /// Hints whether or not should the parking operation be executed at this
    /// time.
    ///
    /// Returning `false` means that the thread should relax and check the lock
    /// again. Returning `true` means that the thread should be put to sleep.
    fn should_park(&self) -> bool;

    /// Updates the inner state whenever the thread fails to acquire the lock.
    ///
    /// This function will be called once whenever both `should_park` returns
    /// `false` **and** the thread fails to acquire the lock.
    fn on_failure(&mut self);
}

/// Immediately requests the thread to be put to sleep.
///
/// No relax operation is executed while waiting for the lock. The generic
/// `R` relax strategy is only used for the short hand-off wait between a new
/// queue head and the previous releaser.
///
/// The default relax operation executed is [`Spin`].
pub struct ImmediatePark<R: Relax = Spin> {
    relax: PhantomData<R>,
}

impl<R: Relax> Park for ImmediatePark<R> {
    type Relax = R;

    #[inline(always)]
    fn new() -> Self {
        Self { relax: PhantomData }
    }

    #[inline(always)]
    fn should_park(&self) -> bool {
        true
    }

    #[cfg(not(tarpaulin_include))]
    fn on_failure(&mut self) {}
}

/// A number of attempts to acquire the lock before parking the thread.
const DEFAULT_ATTEMPTS: u32 = 100;

/// A relax then thread sleeping policy.
///
/// While trying to acquire the lock, the thread initially runs the `R` relax
/// strategy between checks for `ATTEMPTS` failed attempts and then, if still
/// unsuccessful, requests to be put to sleep.
pub struct RelaxThenPark<R: Relax, const ATTEMPTS: u32 = DEFAULT_ATTEMPTS> {
    attempts: u32,
    relax: PhantomData<R>,
}

impl<R: Relax, const ATTEMPTS: u32> Park for RelaxThenPark<R, ATTEMPTS> {
    type Relax = R;

    #[inline(always)]
    fn new() -> Self {
        Self { attempts: 0, relax: PhantomData }
    }

    #[inline(always)]
    fn should_park(&self) -> bool {
        self.attempts >= ATTEMPTS
    }

    #[inline(always)]
    fn on_failure(&mut self) {
        self.attempts += 1;
    }
}

/// A busy-wait spin-loop then thread sleeping policy.
///
/// The [`Spin`] relax strategy is executed during waiting loops.
pub type SpinThenPark = RelaxThenPark<Spin>;

/// A thread yielding then thread sleeping policy.
///
/// The [`Yield`] relax strategy is executed during waiting loops.
pub type YieldThenPark = RelaxThenPark<Yield>;

/// A spin-loop with exponential backoff then thread sleeping policy.
///
/// The [`SpinBackoff`] relax strategy is executed during waiting loops.
pub type SpinBackoffThenPark = RelaxThenPark<SpinBackoff>;

/// A spin-loop with exponential backoff, then thread yielding and finally
/// thread sleeping policy.
///
/// The [`YieldBackoff`] relax strategy is executed during waiting loops.
pub type YieldBackoffThenPark = RelaxThenPark<YieldBackoff>;

#[cfg(all(not(loom), test))]
mod test {
    use super::{Park, DEFAULT_ATTEMPTS};

    fn parking_loop<P: Park>(max: u32) -> (P, u32) {
        let mut parker = P::new();
        let mut counter = 0;
        for _ in 0..=max.saturating_mul(10) {
            while !parker.should_park() {
                parker.on_failure();
                counter += 1;
            }
        }
        (parker, counter)
    }

    fn should_park_eventually<P: Park>() {
        let (waiter, counter) = parking_loop::<P>(DEFAULT_ATTEMPTS);
        assert!(waiter.should_park());
        assert_eq!(DEFAULT_ATTEMPTS, counter);
    }

    #[test]
    fn spins() {
        should_park_eventually::<super::SpinThenPark>();
    }

    #[test]
    fn yields() {
        should_park_eventually::<super::YieldThenPark>();
    }

    #[test]
    fn spin_backoff() {
        should_park_eventually::<super::SpinBackoffThenPark>();
    }

    #[test]
    fn yield_backoff() {
        should_park_eventually::<super::YieldBackoffThenPark>();
    }

    #[test]
    fn custom_attempts() {
        type Short = super::RelaxThenPark<crate::relax::Spin, 3>;
        let (waiter, counter) = parking_loop::<Short>(3);
        assert!(waiter.should_park());
        assert_eq!(3, counter);
    }

    #[test]
    fn immediately() {
        let (waiter, counter) = parking_loop::<super::ImmediatePark>(10);
        assert!(waiter.should_park());
        assert_eq!(0, counter);
    }
}
