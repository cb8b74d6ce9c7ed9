use std::env;
use std::process;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;

use clhlock::park::ImmediatePark;
use clhlock::RawLock;

// Run with `--features log` and `LOG=trace` to see queueing and wake-ups.
#[cfg(feature = "log")]
mod logging {
    use log::{LevelFilter, Log, Metadata, Record};

    struct StderrLogger;

    impl Log for StderrLogger {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            let name = std::thread::current().name().map(str::to_owned);
            let name = name.unwrap_or_else(|| "?".into());
            eprintln!("[{:>5}][{name}] {}", record.level(), record.args());
        }

        fn flush(&self) {}
    }

    pub fn init() {
        static LOGGER: StderrLogger = StderrLogger;
        let level = match std::env::var("LOG").as_deref() {
            Ok("trace") => LevelFilter::Trace,
            Ok("debug") => LevelFilter::Debug,
            _ => LevelFilter::Info,
        };
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(level);
        }
    }
}

const USAGE: &str = "usage: countdown [TASKS] [NESTING] [fair|non-fair]";

fn arg<T: std::str::FromStr>(args: &[String], i: usize, default: T) -> T {
    match args.get(i) {
        None => default,
        Some(arg) => arg.parse().unwrap_or_else(|_| {
            eprintln!("{USAGE}");
            process::exit(2)
        }),
    }
}

fn main() {
    #[cfg(feature = "log")]
    logging::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let tasks: usize = arg(&args, 0, 100);
    let nesting: usize = arg(&args, 1, 10);
    let fair = match args.get(2).map(String::as_str) {
        None | Some("non-fair") => false,
        Some("fair") => true,
        Some(_) => {
            eprintln!("{USAGE}");
            process::exit(2)
        }
    };

    // A shared counter that is only touched while holding the lock, every
    // task takes the lock `nesting` times and decrements once per level.
    let start = (tasks * nesting) as i64;
    let counter = Arc::new(AtomicI64::new(start));
    let lock = Arc::new(RawLock::<ImmediatePark>::new(fair));

    let handles: Vec<_> = (0..tasks)
        .map(|n| {
            let (lock, counter) = (Arc::clone(&lock), Arc::clone(&counter));
            thread::Builder::new()
                .name(format!("task-{n}"))
                .spawn(move || {
                    for _ in 0..nesting {
                        lock.acquire();
                        let value = counter.load(Ordering::Relaxed);
                        counter.store(value - 1, Ordering::Relaxed);
                    }
                    for _ in 0..nesting {
                        lock.release().expect("the task holds the lock");
                    }
                })
                .expect("failed to spawn a task")
        })
        .collect();

    for handle in handles {
        handle.join().expect("a task panicked");
    }

    let end = counter.load(Ordering::Relaxed);
    println!("{tasks} tasks x {nesting} levels (fair: {fair}): {start} -> {end}");
    assert_eq!(end, 0);
}
