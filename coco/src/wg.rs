//! Wait group: an unsigned counter tasks block on until it drops to zero.
//! Mirrors `struct waitGroup` in `waitgroup.h`.

use core::cell::Cell;

use crate::sched;

/// `add` before spawning the tasks that will eventually call `done`;
/// `wait` blocks (yielding) until every `add`ed unit has been matched by a
/// `done`.
pub struct WaitGroup {
    counter: Cell<u32>,
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitGroup {
    pub const fn new() -> WaitGroup {
        WaitGroup { counter: Cell::new(0) }
    }

    pub fn add(&self, n: u32) {
        self.counter.set(self.counter.get() + n);
    }

    /// Decrement the counter. A `done` without a matching prior `add` is
    /// a caller bug; this catches the underflow in debug builds rather
    /// than wrapping silently.
    pub fn done(&self) {
        let c = self.counter.get();
        debug_assert!(c > 0, "wg_done called with counter already at zero");
        self.counter.set(c.saturating_sub(1));
    }

    pub fn check(&self) -> bool {
        self.counter.get() == 0
    }

    pub fn wait(&self) {
        while !self.check() {
            sched::with_sched(crate::sched::Scheduler::yield_now);
        }
    }
}

// SAFETY: see the reasoning in `channel.rs` — exactly one task runs at a
// time, so sharing a `WaitGroup` across a `'static` reference never races.
unsafe impl Sync for WaitGroup {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched;

    #[test]
    fn wait_returns_once_counter_reaches_zero() {
        static WG: WaitGroup = WaitGroup::new();

        extern "C" fn worker(_: *mut u8) {
            sched::with_sched(crate::sched::Scheduler::yield_now);
            WG.done();
            sched::with_current(|s, tid| s.exit(tid, 0));
        }
        extern "C" fn kernel(_: *mut u8) {
            WG.add(3);
            for _ in 0..3 {
                sched::with_sched(|s| s.add_task(worker, core::ptr::null_mut()));
            }
            WG.wait();
            assert!(WG.check());
            sched::with_current(|s, tid| s.exit(tid, 0));
        }
        let status = sched::with_sched(|s| s.start(kernel, core::ptr::null_mut()));
        assert_eq!(status, 0);
    }

    #[test]
    fn check_is_true_for_a_fresh_wait_group() {
        let wg = WaitGroup::new();
        assert!(wg.check());
        wg.add(1);
        assert!(!wg.check());
        wg.done();
        assert!(wg.check());
    }
}
