//! Counting semaphore built on `coco_yield`. Mirrors `coco_sem`/
//! `coco_sem_wait`/`coco_sem_post` in `semaphore.c`: `init=1` gives mutual
//! exclusion, `init=N` gives bounded concurrency, and because no
//! preemption occurs between the permit check and the decrement, the
//! pattern is race-free under this runtime's cooperative model.

use core::cell::Cell;

use crate::sched;

pub struct Semaphore {
    permits: Cell<i32>,
}

impl Semaphore {
    pub const fn new(initial: i32) -> Semaphore {
        Semaphore { permits: Cell::new(initial) }
    }

    /// Block (yielding) while no permit is available, then take one.
    pub fn wait(&self) {
        loop {
            let p = self.permits.get();
            if p > 0 {
                self.permits.set(p - 1);
                return;
            }
            sched::with_sched(crate::sched::Scheduler::yield_now);
        }
    }

    pub fn post(&self) {
        self.permits.set(self.permits.get() + 1);
    }
}

// SAFETY: see the reasoning in `channel.rs` — exactly one task runs at a
// time, so sharing a `Semaphore` across a `'static` reference never races.
unsafe impl Sync for Semaphore {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched;
    use core::cell::Cell as StdCell;

    #[test]
    fn mutex_semaphore_serializes_a_critical_section() {
        static SEM: Semaphore = Semaphore::new(1);
        static COUNTER: StdCell<u32> = StdCell::new(0);
        static MAX_OBSERVED_INSIDE: StdCell<u32> = StdCell::new(0);

        extern "C" fn critical_section(_: *mut u8) {
            SEM.wait();
            let inside = COUNTER.get() + 1;
            COUNTER.set(inside);
            if inside > MAX_OBSERVED_INSIDE.get() {
                MAX_OBSERVED_INSIDE.set(inside);
            }
            sched::with_sched(crate::sched::Scheduler::yield_now);
            COUNTER.set(COUNTER.get() - 1);
            SEM.post();
            sched::with_current(|s, tid| s.exit(tid, 0));
        }
        extern "C" fn kernel(_: *mut u8) {
            let mut tids = [crate::task::TaskId::NONE; 8];
            for slot in &mut tids {
                *slot = sched::with_sched(|s| s.add_task(critical_section, core::ptr::null_mut()));
            }
            let mut status = 0;
            for tid in tids {
                sched::with_sched(|s| s.waitpid(tid, &mut status, 0));
            }
            sched::with_current(|s, tid| s.exit(tid, 0));
        }

        let status = sched::with_sched(|s| s.start(kernel, core::ptr::null_mut()));
        assert_eq!(status, 0);
        assert_eq!(MAX_OBSERVED_INSIDE.get(), 1);
        assert_eq!(COUNTER.get(), 0);
    }

    #[test]
    fn bounded_concurrency_allows_n_permits() {
        let sem = Semaphore::new(2);
        sem.wait();
        sem.wait();
        assert_eq!(sem.permits.get(), 0);
        sem.post();
        assert_eq!(sem.permits.get(), 1);
    }
}
