use std::cell::RefCell;
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;

// Requires the `lock_api` feature.
//
// You may export these types to your callers and change the raw lock type (as
// long as it implements the same raw mutex interfaces) without breaking their
// code.
pub type Mutex<T> = clhlock::lock_api::Mutex<T>;
pub type ReentrantMutex<T> = clhlock::lock_api::ReentrantMutex<T>;

fn main() {
    const N: usize = 10;

    // Spawn a few threads to increment a shared variable (non-atomically), and
    // let the main thread know once all increments are done.
    let data = Arc::new(Mutex::new(0));

    let (tx, rx) = channel();
    for _ in 0..N {
        let (data, tx) = (data.clone(), tx.clone());
        thread::spawn(move || {
            let mut data = data.lock();
            *data += 1;
            if *data == N {
                tx.send(()).unwrap();
            }
        });
    }
    let _message = rx.recv();

    // Would return `None` if lock was already held.
    let count = data.try_lock().unwrap();
    assert_eq!(*count, N);
    drop(count);

    // The reentrant flavour may be locked again by its owner, which only
    // gets shared access to the data.
    let log = ReentrantMutex::new(RefCell::new(Vec::new()));
    let outer = log.lock();
    outer.borrow_mut().push("outer");
    let inner = log.lock();
    inner.borrow_mut().push("inner");
    drop((inner, outer));
    assert_eq!(*log.lock().borrow(), ["outer", "inner"]);
}
