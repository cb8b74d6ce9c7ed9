//! The reentrant queue lock protocol.
//!
//! [`RawLock`] is a bare lock with no protected data. Its state is made of
//! four parts:
//!
//! - an atomic hold count, `0` meaning that the lock is free;
//! - the identity of the owning thread, meaningful only while the hold count
//!   is not zero;
//! - a fairness switch, fixed at construction;
//! - a doubly-linked CLH-style queue of waiting threads, with atomic `head`
//!   and `tail` pointers.
//!
//! The queue always holds at least one record, its head. The head record
//! belongs to the thread that most recently acquired the lock through the
//! queue (or is the sentinel, before that ever happened). A waiting thread may
//! take the lock only when its record's predecessor is the head. When it does,
//! its own record becomes the new head and the old one is detached and freed.
//!
//! The sentinel is never allocated: a null pointer designates it and its
//! forward link is stored inline in the lock. This is what allows `const`
//! construction.

use core::fmt::{self, Debug, Formatter};
use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release, SeqCst};

use crate::cfg::atomic::{AtomicPtr, AtomicUsize};
use crate::cfg::thread::{self, Thread};
use crate::context::ContextId;
use crate::error::ReleaseError;
use crate::park::{ImmediatePark, Park};
use crate::relax::Relax;

/// Owner value for "no owner".
const NO_OWNER: usize = 0;

/// The forward half of a queue record.
///
/// `wakers` counts the releasers that have already given up the lock but are
/// still reading `next` in order to wake the successor. A record may only be
/// freed once it is no longer the head and this count dropped to zero.
#[derive(Debug)]
struct Link {
    next: AtomicPtr<Node>,
    wakers: AtomicUsize,
}

impl Link {
    /// Creates a new, unlinked and core based link (const).
    #[cfg(not(all(loom, test)))]
    const fn new() -> Self {
        let next = AtomicPtr::new(ptr::null_mut());
        let wakers = AtomicUsize::new(0);
        Self { next, wakers }
    }

    /// Creates a new, unlinked and loom based link (non-const).
    #[cfg(all(loom, test))]
    #[cfg(not(tarpaulin_include))]
    fn new() -> Self {
        let next = AtomicPtr::new(ptr::null_mut());
        let wakers = AtomicUsize::new(0);
        Self { next, wakers }
    }

    /// Registers a releaser that is about to read `next` after unlocking.
    fn pin(&self) {
        self.wakers.fetch_add(1, Relaxed);
    }

    /// Unregisters a releaser, all reads through this link are done.
    fn unpin(&self) {
        self.wakers.fetch_sub(1, Release);
    }

    /// A relaxed loop that returns once no releaser is reading this link.
    fn wait_unpinned<R: Relax>(&self) {
        let mut relax = R::new();
        while self.wakers.load(Acquire) != 0 {
            relax.relax();
        }
    }
}

/// A queue record, allocated by a thread that could not take the lock on a
/// fast path.
#[derive(Debug)]
struct Node {
    link: Link,
    prev: AtomicPtr<Node>,
    thread: Thread,
}

impl Node {
    /// Allocates a new, unlinked record for the calling thread.
    fn alloc_current() -> *mut Self {
        let link = Link::new();
        let prev = AtomicPtr::new(ptr::null_mut());
        let thread = thread::current();
        Box::into_raw(Box::new(Self { link, prev, thread }))
    }
}

/// A reentrant mutual exclusion lock that parks contending threads on an
/// intrusive wait queue.
///
/// The lock may be acquired any number of times by the thread that holds it,
/// every [`acquire`] must then be paired with a [`release`]. Threads that
/// cannot take the lock append themselves to the queue with a CAS on its tail,
/// and wait until the releasing thread wakes them up. The waiting behaviour
/// (parking right away or spinning a while first) is selected by the `P`
/// [`Park`] policy.
///
/// # Fairness
///
/// A fair lock (see [`fair`]) always goes through the queue, so the lock is
/// granted in the order threads were queued. A non-fair lock (see
/// [`non_fair`], the default) first tries to take a free lock directly, even
/// if other threads are queued. This barging gives a higher throughput under
/// contention, but queued threads may be overtaken indefinitely: under an
/// adversarial arrival pattern a waiter can starve. This is an accepted
/// outcome of the non-fair mode, not a bug.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
///
/// use clhlock::RawLock;
///
/// let lock: Arc<RawLock> = Arc::new(RawLock::fair());
/// let c_lock = Arc::clone(&lock);
///
/// lock.acquire();
/// lock.acquire();
/// assert_eq!(lock.hold_count(), 2);
///
/// let handle = thread::spawn(move || {
///     // Blocks until the main thread has fully released the lock.
///     c_lock.acquire();
///     c_lock.release().unwrap();
/// });
///
/// lock.release().unwrap();
/// lock.release().unwrap();
/// handle.join().unwrap();
/// assert!(!lock.is_locked());
/// ```
///
/// [`acquire`]: RawLock::acquire
/// [`release`]: RawLock::release
/// [`fair`]: RawLock::fair
/// [`non_fair`]: RawLock::non_fair
pub struct RawLock<P = ImmediatePark> {
    hold_count: AtomicUsize,
    owner: AtomicUsize,
    fair: bool,
    head: AtomicPtr<Node>,
    tail: AtomicPtr<Node>,
    sentinel: Link,
    queued: AtomicUsize,
    park: PhantomData<fn() -> P>,
}

impl<P> RawLock<P> {
    /// Creates a new, unlocked and core based lock (const).
    ///
    /// # Examples
    ///
    /// ```
    /// use clhlock::RawLock;
    ///
    /// static LOCK: RawLock = RawLock::new(true);
    /// assert!(LOCK.is_fair());
    /// ```
    #[cfg(not(all(loom, test)))]
    #[must_use]
    pub const fn new(fair: bool) -> Self {
        let hold_count = AtomicUsize::new(0);
        let owner = AtomicUsize::new(NO_OWNER);
        let head = AtomicPtr::new(ptr::null_mut());
        let tail = AtomicPtr::new(ptr::null_mut());
        let sentinel = Link::new();
        let queued = AtomicUsize::new(0);
        Self { hold_count, owner, fair, head, tail, sentinel, queued, park: PhantomData }
    }

    /// Creates a new, unlocked and loom based lock (non-const).
    #[cfg(all(loom, test))]
    #[cfg(not(tarpaulin_include))]
    pub fn new(fair: bool) -> Self {
        let hold_count = AtomicUsize::new(0);
        let owner = AtomicUsize::new(NO_OWNER);
        let head = AtomicPtr::new(ptr::null_mut());
        let tail = AtomicPtr::new(ptr::null_mut());
        let sentinel = Link::new();
        let queued = AtomicUsize::new(0);
        Self { hold_count, owner, fair, head, tail, sentinel, queued, park: PhantomData }
    }

    /// Creates a new lock that grants the lock in queue order.
    #[cfg(not(all(loom, test)))]
    #[must_use]
    #[inline]
    pub const fn fair() -> Self {
        Self::new(true)
    }

    /// Creates a new fair lock with Loom primitives (non-const).
    #[cfg(all(loom, test))]
    #[cfg(not(tarpaulin_include))]
    pub fn fair() -> Self {
        Self::new(true)
    }

    /// Creates a new lock that lets arriving threads barge ahead of queued
    /// ones.
    #[cfg(not(all(loom, test)))]
    #[must_use]
    #[inline]
    pub const fn non_fair() -> Self {
        Self::new(false)
    }

    /// Creates a new non-fair lock with Loom primitives (non-const).
    #[cfg(all(loom, test))]
    #[cfg(not(tarpaulin_include))]
    pub fn non_fair() -> Self {
        Self::new(false)
    }

    /// Returns `true` if this lock grants the lock in queue order.
    #[inline]
    pub fn is_fair(&self) -> bool {
        self.fair
    }

    /// Returns `true` if the lock is currently held by any thread.
    ///
    /// This function does not guarantee strong ordering, only atomicity.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.hold_count.load(Relaxed) != 0
    }

    /// Returns `true` if the lock is held by the calling thread.
    #[inline]
    pub fn is_owned_by_current_thread(&self) -> bool {
        self.is_owned_by(ContextId::current())
    }

    /// Returns the number of holds on this lock by the calling thread, `0`
    /// if the calling thread does not hold it.
    ///
    /// # Examples
    ///
    /// ```
    /// use clhlock::RawLock;
    ///
    /// let lock: RawLock = RawLock::non_fair();
    /// assert_eq!(lock.hold_count(), 0);
    /// lock.acquire();
    /// lock.acquire();
    /// assert_eq!(lock.hold_count(), 2);
    /// ```
    pub fn hold_count(&self) -> usize {
        if self.is_owned_by_current_thread() {
            self.hold_count.load(Relaxed)
        } else {
            0
        }
    }

    /// Returns the number of threads that are queued and not yet granted the
    /// lock.
    ///
    /// The value may be stale by the time it is observed, it is meant for
    /// monitoring, not for synchronization.
    #[inline]
    pub fn queue_len(&self) -> usize {
        self.queued.load(Acquire)
    }

    /// Returns `true` if the lock is owned by `id`.
    ///
    /// A stale owner value can not be equal to `id` unless it was written by
    /// the `id` thread itself, so a relaxed load is enough.
    fn is_owned_by(&self, id: ContextId) -> bool {
        self.owner.load(Relaxed) == id.as_usize()
    }

    /// Returns `true` if some thread is linked in the queue.
    fn has_queued_threads(&self) -> bool {
        self.head.load(SeqCst) != self.tail.load(SeqCst)
    }

    /// Returns the forward link of a queue record, the sentinel's link if
    /// `node` is null.
    ///
    /// # Safety
    ///
    /// `node` must either be null or point to a record that is not freed for
    /// the duration of the returned borrow.
    unsafe fn link(&self, node: *mut Node) -> &Link {
        match node.is_null() {
            true => &self.sentinel,
            // SAFETY: Caller guarantees that `node` is alive.
            false => unsafe { &(*node).link },
        }
    }

    /// Takes one more hold if the calling thread is the owner.
    fn try_reenter(&self, id: ContextId) -> bool {
        if !self.is_owned_by(id) {
            return false;
        }
        // Only the owner ever writes a non-zero hold count.
        let count = self.hold_count.load(Relaxed);
        let Some(count) = count.checked_add(1) else { overflow() };
        self.hold_count.store(count, Relaxed);
        true
    }

    /// Tries to move the hold count from free to held with a single CAS.
    fn try_lock_free(&self, id: ContextId) -> bool {
        let locked = self.hold_count.compare_exchange(0, 1, SeqCst, SeqCst).is_ok();
        if locked {
            self.owner.store(id.as_usize(), Relaxed);
        }
        locked
    }
}

impl<P: Park> RawLock<P> {
    /// Acquires this lock, blocking the calling thread until it is able to
    /// do so.
    ///
    /// If the calling thread already holds the lock, this only increments
    /// the hold count and returns immediately.
    ///
    /// # Panics
    ///
    /// Panics if the hold count would overflow.
    pub fn acquire(&self) {
        let id = ContextId::current();
        if self.try_reenter(id) {
            return;
        }
        if !self.fair && self.try_lock_free(id) {
            trace!("{id} acquired the lock directly");
            return;
        }
        self.acquire_queued(id);
    }

    /// Attempts to acquire this lock without blocking.
    ///
    /// Returns `true` if the calling thread now holds the lock. A fair lock
    /// is only taken here if no other thread is queued for it.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use std::thread;
    ///
    /// use clhlock::RawLock;
    ///
    /// let lock: Arc<RawLock> = Arc::new(RawLock::non_fair());
    /// assert!(lock.try_acquire());
    ///
    /// let c_lock = Arc::clone(&lock);
    /// let taken = thread::spawn(move || c_lock.try_acquire()).join().unwrap();
    /// assert!(!taken);
    ///
    /// lock.release().unwrap();
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the hold count would overflow.
    pub fn try_acquire(&self) -> bool {
        let id = ContextId::current();
        if self.try_reenter(id) {
            return true;
        }
        if self.fair && self.has_queued_threads() {
            return false;
        }
        self.try_lock_free(id)
    }

    /// Releases one hold of this lock.
    ///
    /// If this was the last hold, the lock is freed and the thread queued
    /// right after the head, if any, is woken up.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::OwnershipViolation`] if the calling thread does
    /// not hold the lock, and [`ReleaseError::StateCorruption`] if it is
    /// recorded as the owner of a lock whose hold count is zero. The lock
    /// state is left untouched in both cases.
    ///
    /// # Examples
    ///
    /// ```
    /// use clhlock::{RawLock, ReleaseError};
    ///
    /// let lock: RawLock = RawLock::non_fair();
    /// assert_eq!(lock.release(), Err(ReleaseError::OwnershipViolation));
    ///
    /// lock.acquire();
    /// assert_eq!(lock.release(), Ok(()));
    /// ```
    pub fn release(&self) -> Result<(), ReleaseError> {
        let id = ContextId::current();
        if !self.is_owned_by(id) {
            return Err(ReleaseError::OwnershipViolation);
        }
        match self.hold_count.load(Relaxed) {
            0 => Err(ReleaseError::StateCorruption),
            1 => {
                self.unlock_and_wake(id);
                Ok(())
            }
            count => {
                self.hold_count.store(count - 1, Relaxed);
                Ok(())
            }
        }
    }

    /// Frees the lock and wakes the successor of the queue head, if any.
    ///
    /// The hold count is published as zero before the successor is looked
    /// up. Together with waiters linking themselves before checking the hold
    /// count, this guarantees that a waiter either observes the free lock or
    /// is observed (and woken) here.
    fn unlock_and_wake(&self, id: ContextId) {
        // The head can not be retired while we still hold the lock.
        let head = self.head.load(Acquire);
        // SAFETY: Pinning the head link before unlocking prevents the next
        // promoted waiter from freeing it until we unpin it.
        let link = unsafe { self.link(head) };
        link.pin();
        self.owner.store(NO_OWNER, Relaxed);
        self.hold_count.store(0, SeqCst);
        // Read through an RMW: it observes the latest successor link, and a
        // waiter linking after it is ordered after the unlock above.
        let null = ptr::null_mut();
        let next = match link.next.compare_exchange(null, null, SeqCst, SeqCst) {
            Ok(next) | Err(next) => next,
        };
        // SAFETY: A linked successor can not be freed before it has been
        // promoted and has observed our pin released.
        let thread = (!next.is_null()).then(|| unsafe { &*next }.thread.clone());
        link.unpin();
        if let Some(thread) = thread {
            trace!("{id} released the lock, waking its queued successor");
            thread.unpark();
        }
    }

    /// Enqueues the calling thread and waits until it is granted the lock.
    #[cold]
    fn acquire_queued(&self, id: ContextId) {
        let ptr = Node::alloc_current();
        // SAFETY: The record was just allocated and is only freed once a
        // successor has been promoted past it.
        unsafe { self.enqueue(ptr) };
        trace!("{id} queued for the lock");
        // SAFETY: The record stays alive at least until we are promoted and
        // then for as long as it is the head.
        let node = unsafe { &*ptr };
        let mut policy = P::new();
        let mut relax = <P::Relax as Relax>::new();
        loop {
            let prev = node.prev.load(Relaxed);
            if prev == self.head.load(SeqCst) && self.try_lock_queued() {
                break;
            }
            if policy.should_park() {
                // Stale wake permits only cause another check.
                thread::park();
            } else {
                policy.on_failure();
                relax.relax();
            }
        }
        self.owner.store(id.as_usize(), Relaxed);
        // SAFETY: We hold the lock and our predecessor is the current head.
        unsafe { self.promote(ptr) };
        trace!("{id} acquired the lock after waiting");
    }

    /// Appends `node` at the tail of the queue and links it both ways.
    ///
    /// # Safety
    ///
    /// `node` must point to a live, unlinked record.
    unsafe fn enqueue(&self, node: *mut Node) {
        let mut tail = self.tail.load(Relaxed);
        let pred = loop {
            match self.tail.compare_exchange_weak(tail, node, AcqRel, Relaxed) {
                Ok(pred) => break pred,
                Err(current) => tail = current,
            }
        };
        // SAFETY: Caller guarantees that `node` is alive.
        unsafe { &*node }.prev.store(pred, Relaxed);
        // SAFETY: `pred` can only be freed once we have been promoted.
        unsafe { self.link(pred) }.next.swap(node, SeqCst);
        self.queued.fetch_add(1, Release);
    }

    /// Tries to take a free lock on behalf of the queue head's successor.
    fn try_lock_queued(&self) -> bool {
        self.hold_count.compare_exchange(0, 1, SeqCst, SeqCst).is_ok()
    }

    /// Makes `node` the queue head, detaching and freeing the old head.
    ///
    /// # Safety
    ///
    /// The calling thread must hold the lock through `node`, and the
    /// predecessor of `node` must be the current head.
    unsafe fn promote(&self, node: *mut Node) {
        // SAFETY: Caller guarantees that `node` is alive, it is the head now.
        let prev = &unsafe { &*node }.prev;
        let old = prev.load(Relaxed);
        self.head.store(node, SeqCst);
        prev.store(ptr::null_mut(), Relaxed);
        // SAFETY: `old` stays alive until we free it below.
        let link = unsafe { self.link(old) };
        link.next.store(ptr::null_mut(), Relaxed);
        // A releaser that pinned the old head is at most reading its `next`
        // field and cloning our thread handle.
        link.wait_unpinned::<P::Relax>();
        if !old.is_null() {
            // SAFETY: Detached, no longer the head and no longer pinned.
            drop(unsafe { Box::from_raw(old) });
        }
        self.queued.fetch_sub(1, Relaxed);
    }
}

impl<P> Drop for RawLock<P> {
    fn drop(&mut self) {
        // No thread can be waiting, the queue is down to its head unless a
        // waiter unwound out of `acquire`. Free whatever is left.
        let head = self.head.load(Relaxed);
        // SAFETY: `&mut self` rules out concurrent access to any record.
        let mut next = unsafe { self.link(head) }.next.load(Relaxed);
        if !head.is_null() {
            // SAFETY: Each record is owned by the queue and reachable once.
            drop(unsafe { Box::from_raw(head) });
        }
        while !next.is_null() {
            let node = next;
            // SAFETY: As above.
            next = unsafe { &(*node).link }.next.load(Relaxed);
            drop(unsafe { Box::from_raw(node) });
        }
    }
}

impl<P> Default for RawLock<P> {
    /// Creates a new, unlocked and non-fair lock.
    #[inline]
    fn default() -> Self {
        Self::non_fair()
    }
}

impl<P> Debug for RawLock<P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawLock")
            .field("fair", &self.fair)
            .field("locked", &self.is_locked())
            .field("queue_len", &self.queue_len())
            .finish()
    }
}

#[cold]
fn overflow() -> ! {
    panic!("lock count overflow in reentrant lock")
}

#[cfg(all(not(loom), test))]
mod test {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::vec::Vec;

    use crate::error::ReleaseError;
    use crate::park::{ImmediatePark, SpinThenPark};

    type RawLock = super::RawLock<ImmediatePark>;

    #[test]
    fn acquire_twice_release_twice() {
        let lock = RawLock::non_fair();
        lock.acquire();
        lock.acquire();
        assert_eq!(lock.hold_count.load(Ordering::Relaxed), 2);
        lock.release().unwrap();
        lock.release().unwrap();
        assert_eq!(lock.hold_count.load(Ordering::Relaxed), 0);
        assert_eq!(lock.owner.load(Ordering::Relaxed), super::NO_OWNER);
        assert!(!lock.is_locked());
    }

    #[test]
    fn release_unheld() {
        let lock = RawLock::fair();
        assert_eq!(lock.release(), Err(ReleaseError::OwnershipViolation));
        assert_eq!(lock.release(), Err(ReleaseError::OwnershipViolation));
        assert!(!lock.is_locked());
    }

    #[test]
    fn release_corrupted_count() {
        let lock = RawLock::non_fair();
        lock.acquire();
        lock.hold_count.store(0, Ordering::Relaxed);
        assert_eq!(lock.release(), Err(ReleaseError::StateCorruption));
        // The failed release left the state as it found it.
        assert!(lock.is_owned_by_current_thread());
        lock.hold_count.store(1, Ordering::Relaxed);
        lock.release().unwrap();
    }

    #[test]
    fn failed_release_keeps_state() {
        let lock = Arc::new(RawLock::non_fair());
        lock.acquire();
        lock.acquire();
        let c_lock = Arc::clone(&lock);
        let err = thread::spawn(move || c_lock.release()).join().unwrap();
        assert_eq!(err, Err(ReleaseError::OwnershipViolation));
        assert_eq!(lock.hold_count(), 2);
        assert!(lock.is_owned_by_current_thread());
        lock.release().unwrap();
        lock.release().unwrap();
    }

    #[test]
    fn fair_acquire_goes_through_queue() {
        let lock = RawLock::fair();
        lock.acquire();
        // The first queued acquisition retires the sentinel.
        let head = lock.head.load(Ordering::Relaxed);
        assert!(!head.is_null());
        assert_eq!(head, lock.tail.load(Ordering::Relaxed));
        assert_eq!(lock.queue_len(), 0);
        lock.release().unwrap();
        lock.acquire();
        assert_ne!(head, lock.head.load(Ordering::Relaxed));
        lock.release().unwrap();
    }

    #[test]
    fn non_fair_uncontended_never_queues() {
        let lock = RawLock::non_fair();
        for _ in 0..10 {
            lock.acquire();
            lock.release().unwrap();
        }
        assert!(lock.head.load(Ordering::Relaxed).is_null());
        assert!(lock.tail.load(Ordering::Relaxed).is_null());
    }

    #[test]
    fn queued_threads_detected() {
        let lock = Arc::new(RawLock::fair());
        lock.acquire();
        assert!(!lock.has_queued_threads());
        let c_lock = Arc::clone(&lock);
        let waiter = thread::spawn(move || {
            c_lock.acquire();
            c_lock.release().unwrap();
        });
        while lock.queue_len() == 0 {
            thread::yield_now();
        }
        assert!(lock.has_queued_threads());
        // The owner always re-enters, even with a queued thread.
        assert!(lock.try_acquire());
        assert_eq!(lock.hold_count(), 2);
        lock.release().unwrap();
        lock.release().unwrap();
        waiter.join().unwrap();
        assert!(!lock.has_queued_threads());
    }

    #[test]
    fn queue_len_counts_waiters() {
        let lock = Arc::new(RawLock::non_fair());
        let done = Arc::new(AtomicBool::new(false));
        lock.acquire();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let c_lock = Arc::clone(&lock);
                let c_done = Arc::clone(&done);
                thread::spawn(move || {
                    c_lock.acquire();
                    assert!(c_done.load(Ordering::Relaxed));
                    c_lock.release().unwrap();
                })
            })
            .collect();
        while lock.queue_len() != 3 {
            thread::yield_now();
        }
        done.store(true, Ordering::Relaxed);
        lock.release().unwrap();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(lock.queue_len(), 0);
        assert_eq!(lock.head.load(Ordering::Relaxed), lock.tail.load(Ordering::Relaxed));
    }

    #[test]
    fn spin_then_park_hand_off() {
        let lock = Arc::new(super::RawLock::<SpinThenPark>::fair());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c_lock = Arc::clone(&lock);
                thread::spawn(move || {
                    for _ in 0..200 {
                        c_lock.acquire();
                        c_lock.release().unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(!lock.is_locked());
    }

    #[test]
    #[should_panic(expected = "lock count overflow")]
    fn hold_count_overflow() {
        let lock = RawLock::non_fair();
        lock.acquire();
        lock.hold_count.store(usize::MAX, Ordering::Relaxed);
        lock.acquire();
    }

    #[test]
    fn debug() {
        let lock = RawLock::fair();
        let msg = "RawLock { fair: true, locked: false, queue_len: 0 }";
        assert_eq!(msg, format!("{lock:?}"));
    }
}
