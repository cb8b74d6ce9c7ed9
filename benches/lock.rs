use std::cell::Cell;
use std::sync::Arc;
use std::thread;

use clhlock::reentrant::{parks, spins};
use clhlock::RawLock;
use criterion::{black_box, criterion_group, criterion_main, Bencher, Criterion};

fn create(bencher: &mut Bencher) {
    bencher.iter(|| {
        let value = black_box(0);
        parks::ReentrantMutex::new(value)
    });
}

fn acquire_release(bencher: &mut Bencher, lock: &RawLock) {
    bencher.iter(|| {
        lock.acquire();
        black_box(lock.release())
    });
}

fn reacquire_release(bencher: &mut Bencher) {
    let mutex = parks::ReentrantMutex::new(Cell::new(0_u32));
    let _outer = mutex.lock();
    bencher.iter(|| {
        let guard = mutex.lock();
        guard.set(guard.get().wrapping_add(1));
    });
}

fn lock_unlock_contention<F>(bencher: &mut Bencher, new: F)
where
    F: Fn() -> spins::ReentrantMutex<Cell<u32>>,
{
    let data = Arc::new(new());

    let thread = thread::spawn({
        let data = Arc::clone(&data);
        move || {
            while Arc::strong_count(&data) > 1 {
                for _ in 0..1000 {
                    let m = data.lock();
                    m.set(m.get().wrapping_add(1));
                }
            }
        }
    });

    bencher.iter(|| {
        let m = data.lock();
        m.set(m.get().wrapping_add(1));
    });

    drop(data);
    thread.join().unwrap();
}

fn uncontended(c: &mut Criterion) {
    c.bench_function("create", create);
    c.bench_function("acquire-release-non-fair", |b| acquire_release(b, &RawLock::non_fair()));
    c.bench_function("acquire-release-fair", |b| acquire_release(b, &RawLock::fair()));
    c.bench_function("reacquire-release", reacquire_release);
}

fn contended(c: &mut Criterion) {
    c.bench_function("lock-unlock-contention-non-fair", |b| {
        lock_unlock_contention(b, || spins::ReentrantMutex::new(Cell::new(0)));
    });
    c.bench_function("lock-unlock-contention-fair", |b| {
        lock_unlock_contention(b, || spins::ReentrantMutex::new_fair(Cell::new(0)));
    });
}

criterion_group!(lock, uncontended, contended);
criterion_main!(lock);
