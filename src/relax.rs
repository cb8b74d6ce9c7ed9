// Modified version of relax.rs from spin-rs to support Loom yielding and
// exponential backoff.
//
// Original file at its most recent change (at the time of writing):
// https://github.com/mvdnes/spin-rs/blob/5860ee114094cf200b97348ff332155fbd7159b4/src/relax.rs
//
// Copyright (c) 2014 Mathijs van de Nes
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Strategies that determine how a waiting thread burns time between two
//! checks of the lock, before it is finally parked.

use crate::cfg::hint;
use crate::cfg::thread;

/// A trait implemented by spinning relax strategies.
pub trait Relax {
    /// Initialize the state for the relaxing operation, if any.
    fn new() -> Self;

    /// Perform the relaxing operation during a period of contention.
    fn relax(&mut self);
}

/// A strategy that rapidly spins while informing the CPU that it should power
/// down non-essential components via [`core::hint::spin_loop`].
///
/// Spinning is only worth it when the lock is expected to be released within
/// a few hundred cycles. Most schedulers cannot tell it apart from useful
/// work, see [priority inversion].
///
/// [priority inversion]: https://matklad.github.io/2020/01/02/spinlocks-considered-harmful.html
pub struct Spin;

impl Relax for Spin {
    #[inline(always)]
    fn new() -> Self {
        Self
    }

    #[inline(always)]
    fn relax(&mut self) {
        hint::spin_loop();
    }
}

/// A strategy that yields the current time slice to the scheduler in favour of
/// other threads or processes.
pub struct Yield;

impl Relax for Yield {
    #[inline(always)]
    fn new() -> Self {
        Self
    }

    #[inline]
    fn relax(&mut self) {
        thread::yield_now();
    }
}

// Exponential backoff is based on the crossbeam-utils implementation.
// link to most recent change (as the time of writing):
// https://github.com/crossbeam-rs/crossbeam/blob/371de8c2d304db07662450995848f3dc9598ac99/crossbeam-utils/src/backoff.rs
//
// Copyright (c) 2019 The Crossbeam Project Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

/// A strategy that, as [`Spin`], will run a busy-wait spin-loop, except each
/// call spins twice as long as the previous one, up to `2^SPIN_LIMIT` hints.
pub struct SpinBackoff {
    step: u32,
}

impl SpinBackoff {
    const SPIN_LIMIT: u32 = 6;
}

impl Relax for SpinBackoff {
    #[inline(always)]
    fn new() -> Self {
        Self { step: 0 }
    }

    #[inline(always)]
    fn relax(&mut self) {
        spin_exp(self.step);
        self.step = (self.step + 1).min(Self::SPIN_LIMIT);
    }
}

/// A strategy that, as [`Yield`], will yield back to the OS scheduler, but only
/// after `SPIN_LIMIT` rounds of exponential backoff in a spin loop.
pub struct YieldBackoff {
    step: u32,
}

impl YieldBackoff {
    const SPIN_LIMIT: u32 = SpinBackoff::SPIN_LIMIT;
}

impl Relax for YieldBackoff {
    #[inline(always)]
    fn new() -> Self {
        Self { step: 0 }
    }

    #[inline(always)]
    fn relax(&mut self) {
        if self.step < Self::SPIN_LIMIT {
            spin_exp(self.step);
            self.step += 1;
        } else {
            thread::yield_now();
        }
    }
}

/// Issues `2^step` spin hints.
#[inline(always)]
fn spin_exp(step: u32) {
    for _ in 0..1u32 << step {
        hint::spin_loop();
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use super::{Relax, SpinBackoff, YieldBackoff};

    #[test]
    fn spin_backoff_saturates() {
        let mut relax = SpinBackoff::new();
        for _ in 0..32 {
            relax.relax();
        }
        assert_eq!(relax.step, SpinBackoff::SPIN_LIMIT);
    }

    #[test]
    fn yield_backoff_stops_spinning_at_limit() {
        let mut relax = YieldBackoff::new();
        for _ in 0..YieldBackoff::SPIN_LIMIT - 1 {
            relax.relax();
        }
        assert_eq!(relax.step, YieldBackoff::SPIN_LIMIT - 1);
        for _ in 0..32 {
            relax.relax();
        }
        assert_eq!(relax.step, YieldBackoff::SPIN_LIMIT);
    }
}
