use core::fmt::{self, Display, Formatter};

/// The error type returned by [`RawLock::release`].
///
/// A failed release never alters the state of the lock: the hold count and
/// the owner are left exactly as they were observed.
///
/// [`RawLock::release`]: crate::RawLock::release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReleaseError {
    /// The calling thread does not currently own the lock.
    ///
    /// This is always a misuse by the caller.
    OwnershipViolation,
    /// The calling thread is recorded as the owner, but the hold count is
    /// zero.
    ///
    /// This is unreachable under correct concurrent use and indicates that an
    /// internal invariant was broken.
    StateCorruption,
}

impl Display for ReleaseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::OwnershipViolation => f.write_str("lock is not owned by the current thread"),
            Self::StateCorruption => f.write_str("lock is owned with a hold count of zero"),
        }
    }
}

impl std::error::Error for ReleaseError {}
