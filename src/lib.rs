//! A reentrant, optionally fair mutual exclusion lock that parks contending
//! threads on a CLH-style intrusive wait queue.
//!
//! The lock is built from a handful of atomic registers and a queue of
//! heap-allocated records linked with compare-and-swap operations:
//!
//! - a hold count, where `0` means that the lock is free;
//! - the identity of the owning thread, so that the owner may acquire the
//!   lock again without deadlocking itself;
//! - a fairness switch, fixed at construction;
//! - a doubly-linked wait queue with atomic `head` and `tail` pointers.
//!
//! A thread that can not take the lock appends a record for itself at the
//! tail of the queue and goes to sleep. A thread becomes eligible for the lock
//! once its predecessor is the queue head, and the releasing thread wakes
//! exactly that successor. Wake-ups are permit based ([`Thread::unpark`]), so a
//! wake-up sent before the target actually parks is never lost.
//!
//! ## Fairness
//!
//! A fair lock routes every acquisition through the queue, granting the lock
//! in FIFO order. A non-fair lock lets an arriving thread take a free lock
//! directly, ahead of queued threads. Barging improves throughput under
//! contention but can starve queued threads indefinitely, which is accepted
//! behaviour for that mode.
//!
//! ## Interfaces
//!
//! - [`RawLock`] is the bare protocol, with explicit [`acquire`] and
//!   [`release`] calls. Releasing a lock that the calling thread does not own
//!   returns a [`ReleaseError`].
//! - [`reentrant::ReentrantMutex`] owns the protected data and hands out RAII
//!   guards with shared access to it.
//! - [`lock_api`] (feature `lock_api`) plugs [`RawLock`] into the [lock_api]
//!   crate.
//!
//! The waiting behaviour is selected by a [`Park`] policy: threads may park
//! as soon as the lock is found busy ([`ImmediatePark`], the default), or may
//! spin or yield for a bounded number of attempts first.
//!
//! ## Features
//!
//! This crate does not provide any default features. Features that can be
//! enabled are:
//!
//! ### lock_api
//!
//! Implements [`lock_api::RawMutex`] for [`RawLock`] and exports
//! `lock_api::Mutex` and `lock_api::ReentrantMutex` type aliases.
//!
//! ### log
//!
//! Emits [log] `trace` records (target `clhlock`) for direct acquisitions,
//! queueing, acquisitions after waiting and successor wake-ups.
//!
//! [`acquire`]: RawLock::acquire
//! [`release`]: RawLock::release
//! [`Park`]: park::Park
//! [`ImmediatePark`]: park::ImmediatePark
//! [`Thread::unpark`]: std::thread::Thread::unpark
//! [`lock_api`]: crate::lock_api
//! [`lock_api::RawMutex`]: https://docs.rs/lock_api/latest/lock_api/trait.RawMutex.html
//! [lock_api]: https://crates.io/crates/lock_api
//! [log]: https://crates.io/crates/log

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Emits a `trace` record when the `log` feature is enabled, evaluates
/// nothing otherwise.
macro_rules! trace {
    ($($arg:tt)+) => {{
        #[cfg(feature = "log")]
        log::trace!(target: "clhlock", $($arg)+);
        #[cfg(not(feature = "log"))]
        let _ = format_args!($($arg)+);
    }};
}

pub mod park;
pub mod relax;
pub mod reentrant;

#[cfg(all(feature = "lock_api", not(loom)))]
#[cfg_attr(docsrs, doc(cfg(feature = "lock_api")))]
pub mod lock_api;

mod cfg;
mod context;
mod error;
mod raw;

pub use context::ContextId;
pub use error::ReleaseError;
pub use raw::RawLock;

#[cfg(test)]
pub(crate) mod test;

#[cfg(all(loom, test))]
#[cfg(not(tarpaulin_include))]
pub(crate) mod loom;
