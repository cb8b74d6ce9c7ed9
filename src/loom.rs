pub mod models {
    use core::array;

    use loom::sync::Arc;
    use loom::{model, thread};

    use crate::test::{get, inc, nested_inc, try_inc, Int};
    use crate::test::{LockThen, TryLockThen};

    /// Get a copy of the shared integer, converting it to usize.
    ///
    /// Panics if the cast fails.
    fn get_unwrap<L>(lock: &Arc<L>) -> usize
    where
        L: LockThen<Target = crate::test::Counter>,
    {
        let value: Int = get(lock);
        value.try_into().unwrap()
    }

    // Three or more lock threads make these models run for too long. Two
    // threads still cover a waiter being queued behind the sentinel, promoted
    // and freeing it.
    const LOCKS: usize = 2;
    const TRY_LOCKS: usize = 3;

    /// Evaluates that concurrent `try_lock` calls will serialize all mutations
    /// against the shared data, therefore no data races.
    pub fn try_lock_join<L>()
    where
        L: TryLockThen<Target = crate::test::Counter> + Send + Sync + 'static,
    {
        model(|| {
            const RUNS: usize = TRY_LOCKS;
            let lock = Arc::new(L::new(Default::default()));
            let handles: [_; RUNS] = array::from_fn(|_| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || try_inc(&lock))
            });
            for handle in handles {
                handle.join().unwrap();
            }
            let value = get_unwrap(&lock);
            assert!((1..=RUNS).contains(&value));
        });
    }

    /// Evaluates that concurrent `lock` calls will serialize all mutations
    /// against the shared data, and that no waiter misses its wake-up (a
    /// lost wake-up shows up as a deadlock of the model).
    pub fn lock_join<L>()
    where
        L: LockThen<Target = crate::test::Counter> + Send + Sync + 'static,
    {
        model(|| {
            const RUNS: usize = LOCKS;
            let lock = Arc::new(L::new(Default::default()));
            let handles: [_; RUNS] = array::from_fn(|_| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || inc(&lock))
            });
            for handle in handles {
                handle.join().unwrap();
            }
            let value = get_unwrap(&lock);
            assert_eq!(RUNS, value);
        });
    }

    /// Evaluates that concurrent `lock` and `try_lock` calls will serialize
    /// all mutations against the shared data, therefore no data races.
    pub fn mixed_lock_join<L>()
    where
        L: TryLockThen<Target = crate::test::Counter> + Send + Sync + 'static,
    {
        model(|| {
            const RUNS: usize = LOCKS;
            let lock = Arc::new(L::new(Default::default()));
            let handles: [_; RUNS] = array::from_fn(|run| {
                let lock = Arc::clone(&lock);
                let f = if run % 2 == 0 { inc } else { try_inc };
                thread::spawn(move || f(&lock))
            });
            for handle in handles {
                handle.join().unwrap();
            }
            let value = get_unwrap(&lock);
            assert!((1..=RUNS).contains(&value));
        });
    }

    /// Evaluates that nested acquisitions by the owner never block, while
    /// a concurrent thread only gets the lock once every level is released.
    pub fn nested_lock_join<L>()
    where
        L: LockThen<Target = crate::test::Counter> + Send + Sync + 'static,
    {
        model(|| {
            const RUNS: usize = LOCKS;
            let lock = Arc::new(L::new(Default::default()));
            let handles: [_; RUNS] = array::from_fn(|_| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || nested_inc::<L, 2>(&lock))
            });
            for handle in handles {
                handle.join().unwrap();
            }
            let value = get_unwrap(&lock);
            assert_eq!(RUNS, value);
        });
    }
}
