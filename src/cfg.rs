pub mod atomic {
    #[cfg(not(all(loom, test)))]
    pub use core::sync::atomic::{AtomicPtr, AtomicUsize};

    #[cfg(all(loom, test))]
    pub use loom::sync::atomic::{AtomicPtr, AtomicUsize};
}

pub mod hint {
    #[cfg(not(all(loom, test)))]
    pub use core::hint::spin_loop;

    #[cfg(all(loom, test))]
    pub use loom::hint::spin_loop;
}

pub mod thread {
    #[cfg(not(all(loom, test)))]
    pub use std::thread::{current, park, yield_now, Thread};

    #[cfg(all(loom, test))]
    pub use loom::thread::{current, park, yield_now, Thread};

    #[cfg(not(all(loom, test)))]
    pub use std::thread_local;

    #[cfg(all(loom, test))]
    pub use loom::thread_local;
}
