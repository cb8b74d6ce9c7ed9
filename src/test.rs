use core::cell::Cell;

#[cfg(all(loom, test))]
use loom::sync::Arc;

#[cfg(not(all(loom, test)))]
use std::sync::Arc;

/// A trait for lock types that can hold user defined values.
pub trait LockNew {
    /// The type of the value this lock holds.
    type Target: ?Sized;

    /// Creates a new lock in an unlocked state ready for use.
    fn new(value: Self::Target) -> Self
    where
        Self::Target: Sized;
}

/// A trait for reentrant locks that run closures against a shared reference
/// of the protected data.
pub trait LockThen: LockNew {
    /// Acquires the lock and then runs the closure against the protected data.
    fn lock_then<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(&Self::Target) -> Ret;
}

/// A trait for reentrant locks that test if the lock is busy and run closures
/// against the protected data in case of success.
pub trait TryLockThen: LockThen {
    /// Attempts to acquire the lock and then runs the closure against the
    /// protected data if successful.
    fn try_lock_then<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(Option<&Self::Target>) -> Ret;

    /// Returns `true` if the lock is currently held.
    #[cfg_attr(all(loom, test), allow(dead_code))]
    fn is_locked(&self) -> bool;
}

/// A trait for lock types that can return either the underlying value (by
/// consuming the lock) or a exclusive reference to it.
#[cfg(not(loom))]
pub trait LockData: LockNew {
    /// Consumes this lock, returning the underlying data.
    fn into_inner(self) -> Self::Target
    where
        Self::Target: Sized;

    /// Returns a mutable reference to the underlying data.
    fn get_mut(&mut self) -> &mut Self::Target;
}

/// An arbitrary unsigned integer type.
pub type Int = u32;

/// A shared integer, non-atomically mutated through shared references.
pub type Counter = Cell<Int>;

/// Get a copy of the shared integer.
pub fn get<L>(lock: &Arc<L>) -> Int
where
    L: LockThen<Target = Counter>,
{
    lock.lock_then(Cell::get)
}

/// Increments a shared integer.
pub fn inc<L>(lock: &Arc<L>)
where
    L: LockThen<Target = Counter>,
{
    lock.lock_then(inc_inner);
}

/// Tries to increment a shared integer.
pub fn try_inc<L>(lock: &Arc<L>)
where
    L: TryLockThen<Target = Counter>,
{
    lock.try_lock_then(|data| data.map(inc_inner));
}

/// Increments a shared integer from within `DEPTH` nested acquisitions.
pub fn nested_inc<L, const DEPTH: usize>(lock: &Arc<L>)
where
    L: LockThen<Target = Counter>,
{
    fn recurse<L>(lock: &L, depth: usize)
    where
        L: LockThen<Target = Counter>,
    {
        lock.lock_then(|data| match depth {
            0 => inc_inner(data),
            _ => recurse(lock, depth - 1),
        });
    }
    recurse(&**lock, DEPTH);
}

/// Non-atomically increments a shared integer.
fn inc_inner(data: &Counter) {
    let value = data.get();
    data.set(value + 1);
}

#[cfg(all(not(loom), test))]
pub mod tests {
    // Modified test suite from the Rust's Mutex and ReentrantLock
    // implementations with changes since the API is not compatible with this
    // crate implementation and some new tests as well.
    //
    // Copyright 2014 The Rust Project Developers.
    //
    // Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
    // http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
    // <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
    // option. This file may not be copied, modified, or distributed
    // except according to those terms.

    use core::cell::{Cell, RefCell};
    use core::ops::RangeInclusive;
    use std::fmt::Debug;
    use std::format;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::channel;
    use std::sync::Arc;
    use std::thread;
    use std::vec::Vec;

    use super::{get, inc, nested_inc, try_inc, Counter, Int};
    use super::{LockData, LockThen, TryLockThen};

    #[derive(Eq, PartialEq, Debug)]
    pub struct NonCopy(u32);

    pub struct Foo(Arc<AtomicUsize>);

    impl Drop for Foo {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    const ITERS: Int = 1000;
    const THREADS: Int = 4;
    const DEPTH: usize = 10;
    const EXPECTED_VALUE: Int = ITERS * THREADS;
    const EXPECTED_RANGE: RangeInclusive<Int> = 1..=EXPECTED_VALUE;

    fn lock_inc_for<L, const END: Int>(lock: &Arc<L>)
    where
        L: LockThen<Target = Counter>,
    {
        for _ in 0..END {
            inc::<L>(lock);
        }
    }

    fn try_lock_inc_for<L, const END: Int>(lock: &Arc<L>)
    where
        L: TryLockThen<Target = Counter>,
    {
        for _ in 0..END {
            try_inc::<L>(lock);
        }
    }

    fn mixed_lock_inc_for<L, const END: Int>(lock: &Arc<L>)
    where
        L: TryLockThen<Target = Counter>,
    {
        for r in 0..END {
            let f = if r % 2 == 0 { inc } else { try_inc };
            f(lock);
        }
    }

    fn nested_lock_inc_for<L, const END: Int>(lock: &Arc<L>)
    where
        L: LockThen<Target = Counter>,
    {
        for _ in 0..END {
            nested_inc::<L, DEPTH>(lock);
        }
    }

    fn lots_and_lots<L, const THREADS: Int>(f: fn(&Arc<L>)) -> Int
    where
        L: LockThen<Target = Counter> + Send + Sync + 'static,
    {
        let lock = Arc::new(L::new(Cell::new(0)));
        let (tx, rx) = channel();
        for _ in 0..THREADS {
            let c_lock = Arc::clone(&lock);
            let c_tx = tx.clone();
            thread::spawn(move || {
                f(&c_lock);
                c_tx.send(()).unwrap();
            });
        }
        drop(tx);
        for _ in 0..THREADS {
            rx.recv().unwrap();
        }
        get(&lock)
    }

    pub fn lots_and_lots_lock<L>()
    where
        L: LockThen<Target = Counter> + Send + Sync + 'static,
    {
        let value = lots_and_lots::<L, THREADS>(lock_inc_for::<L, ITERS>);
        assert_eq!(value, EXPECTED_VALUE);
    }

    pub fn lots_and_lots_try_lock<L>()
    where
        L: TryLockThen<Target = Counter> + Send + Sync + 'static,
    {
        let value = lots_and_lots::<L, THREADS>(try_lock_inc_for::<L, ITERS>);
        assert!(EXPECTED_RANGE.contains(&value));
    }

    pub fn lots_and_lots_mixed_lock<L>()
    where
        L: TryLockThen<Target = Counter> + Send + Sync + 'static,
    {
        let value = lots_and_lots::<L, THREADS>(mixed_lock_inc_for::<L, ITERS>);
        assert!(EXPECTED_RANGE.contains(&value));
    }

    pub fn lots_and_lots_nested_lock<L>()
    where
        L: LockThen<Target = Counter> + Send + Sync + 'static,
    {
        let value = lots_and_lots::<L, THREADS>(nested_lock_inc_for::<L, ITERS>);
        assert_eq!(value, EXPECTED_VALUE);
    }

    pub fn smoke<L>()
    where
        L: LockThen<Target = Int>,
    {
        let lock = L::new(1);
        lock.lock_then(|data| assert_eq!(*data, 1));
        lock.lock_then(|data| assert_eq!(*data, 1));
    }

    pub fn reentrant_smoke<L>()
    where
        L: TryLockThen<Target = RefCell<Vec<Int>>>,
    {
        let lock = L::new(RefCell::new(Vec::new()));
        lock.lock_then(|outer| {
            outer.borrow_mut().push(1);
            lock.lock_then(|inner| {
                inner.borrow_mut().push(2);
                lock.try_lock_then(|innermost| innermost.unwrap().borrow_mut().push(3));
            });
            assert!(lock.is_locked());
        });
        assert!(!lock.is_locked());
        lock.lock_then(|data| assert_eq!(*data.borrow(), [1, 2, 3]));
    }

    pub fn test_mutex_debug<L>()
    where
        L: LockThen<Target = Int> + Debug + Send + Sync + 'static,
    {
        let value = 42;
        let lock = Arc::new(L::new(value));
        let msg = format!("ReentrantMutex {{ data: {value:?} }}");
        assert_eq!(msg, format!("{lock:?}"));

        let c_lock = Arc::clone(&lock);
        lock.lock_then(|_data| {
            // The owner re-enters and sees the data.
            assert_eq!(msg, format!("{:?}", *c_lock));
            let locked = thread::spawn(move || format!("{:?}", *c_lock)).join().unwrap();
            assert_eq!("ReentrantMutex { data: <locked> }", locked);
        });
    }

    pub fn test_mutex_default<L>()
    where
        L: LockData<Target = Int> + Default,
    {
        let lock: L = Default::default();
        assert_eq!(Int::default(), lock.into_inner());
    }

    pub fn test_mutex_from<L>()
    where
        L: LockData<Target = Int> + From<Int>,
    {
        let value = 42;
        let lock = L::from(value);
        assert_eq!(value, lock.into_inner());
    }

    pub fn test_try_lock<L>()
    where
        L: TryLockThen<Target = ()> + Send + Sync + 'static,
    {
        let lock = Arc::new(L::new(()));
        let c_lock = Arc::clone(&lock);
        lock.try_lock_then(|data| {
            assert!(data.is_some());
            assert!(c_lock.is_locked());
            let taken = thread::spawn(move || c_lock.try_lock_then(|data| data.is_some()));
            assert!(!taken.join().unwrap());
        });
        assert!(!lock.is_locked());
    }

    pub fn test_into_inner<L>()
    where
        L: LockData<Target = NonCopy>,
    {
        let lock = L::new(NonCopy(10));
        assert_eq!(lock.into_inner(), NonCopy(10));
    }

    pub fn test_into_inner_drop<L>()
    where
        L: LockData<Target = Foo>,
    {
        let num_drops = Arc::new(AtomicUsize::new(0));
        let lock = L::new(Foo(num_drops.clone()));
        assert_eq!(num_drops.load(Ordering::SeqCst), 0);
        {
            let _inner = lock.into_inner();
            assert_eq!(num_drops.load(Ordering::SeqCst), 0);
        }
        assert_eq!(num_drops.load(Ordering::SeqCst), 1);
    }

    pub fn test_get_mut<L>()
    where
        L: LockData<Target = NonCopy>,
    {
        let mut lock = L::new(NonCopy(10));
        *lock.get_mut() = NonCopy(20);
        assert_eq!(lock.into_inner(), NonCopy(20));
    }

    pub fn test_lock_arc_nested<L1, L2>()
    where
        L1: LockThen<Target = Counter>,
        L2: LockThen<Target = Arc<L1>> + Send + Sync + 'static,
    {
        // Tests nested locks and access
        // to underlying data.
        let arc1 = Arc::new(L1::new(Cell::new(1)));
        let arc2 = Arc::new(L2::new(arc1));
        let _t = thread::spawn(move || {
            let val = arc2.lock_then(get);
            assert_eq!(val, 1);
        })
        .join();
    }

    pub fn test_acquire_more_than_one_lock<L>()
    where
        L: LockThen<Target = Int> + Send + Sync + 'static,
    {
        let arc = Arc::new(L::new(1));
        let mut threads = Vec::new();
        for _ in 0..4 {
            let c_arc = Arc::clone(&arc);
            let t = thread::spawn(move || {
                c_arc.lock_then(|_d| {
                    let lock = L::new(1);
                    lock.lock_then(|_d| ());
                });
            });
            threads.push(t);
        }
        for thread in threads {
            let _t = thread.join();
        }
    }

    pub fn test_lock_arc_access_in_unwind<L>()
    where
        L: LockThen<Target = Counter> + Send + Sync + 'static,
    {
        let arc = Arc::new(L::new(Cell::new(1)));
        let arc2 = arc.clone();
        let _ = thread::spawn(move || {
            struct Unwinder<T: LockThen<Target = Counter>> {
                i: Arc<T>,
            }
            impl<T: LockThen<Target = Counter>> Drop for Unwinder<T> {
                fn drop(&mut self) {
                    inc(&self.i);
                }
            }
            let u = Unwinder { i: arc2 };
            // Unwinds while holding two levels of the lock.
            u.i.lock_then(|_| u.i.lock_then(|_| panic!()));
        })
        .join();
        let value = get(&arc);
        assert_eq!(value, 2);
    }
}
