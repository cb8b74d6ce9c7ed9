//! Execution context identities.
//!
//! A lock records its owner as an opaque, comparable token rather than as a
//! native thread handle. Tokens are handed out once per thread, from a global
//! counter, the first time a thread asks for its identity. They are never
//! reused for the lifetime of the process, so a thread that exits while still
//! owning a lock can not be mistaken for a later thread.

use core::fmt::{self, Debug, Display, Formatter};
use core::num::NonZeroUsize;
use core::sync::atomic::AtomicUsize;
use core::sync::atomic::Ordering::Relaxed;

use crate::cfg::thread::thread_local;

/// An opaque identity token of an execution context (a thread).
///
/// Two `ContextId`s compare equal if and only if they were obtained on the
/// same thread.
///
/// # Examples
///
/// ```
/// use std::thread;
/// use clhlock::ContextId;
///
/// let here = ContextId::current();
/// assert_eq!(here, ContextId::current());
///
/// let there = thread::spawn(ContextId::current).join().unwrap();
/// assert_ne!(here, there);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ContextId(NonZeroUsize);

// The counter itself is not part of any lock protocol, so it is never a Loom
// primitive: it only has to hand out unique values.
static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static CURRENT: ContextId = ContextId::next();
}

impl ContextId {
    /// Returns the identity of the calling thread.
    #[inline]
    pub fn current() -> Self {
        CURRENT.with(|id| *id)
    }

    /// Returns the raw, non-zero integer value of this identity.
    #[must_use]
    #[inline(always)]
    pub const fn get(self) -> NonZeroUsize {
        self.0
    }

    /// Returns this identity as a plain integer, as stored by lock owners.
    #[inline(always)]
    pub(crate) const fn as_usize(self) -> usize {
        self.0.get()
    }

    /// Allocates a new, unique identity.
    fn next() -> Self {
        let id = NEXT_ID.fetch_add(1, Relaxed);
        match NonZeroUsize::new(id) {
            Some(id) => Self(id),
            None => exhausted(),
        }
    }
}

#[cold]
fn exhausted() -> ! {
    panic!("failed to generate unique context ID: bitspace exhausted")
}

impl Debug for ContextId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContextId").field(&self.0).finish()
    }
}

impl Display for ContextId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use std::collections::HashSet;
    use std::thread;
    use std::vec::Vec;

    use super::ContextId;

    #[test]
    fn stable_within_thread() {
        let first = ContextId::current();
        let second = ContextId::current();
        assert_eq!(first, second);
        assert_eq!(first.get(), second.get());
    }

    #[test]
    fn unique_across_threads() {
        let handles: Vec<_> = (0..8).map(|_| thread::spawn(ContextId::current)).collect();
        let mut ids: HashSet<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 8);
        assert!(ids.insert(ContextId::current()));
    }

    #[test]
    fn display() {
        let id = ContextId::current();
        assert_eq!(format!("{id}"), format!("#{}", id.get()));
    }
}
