//! A counter backed by a capacity-1 buffered channel acting as a single-slot
//! mailbox (extract takes the only token, send puts it back), incremented by
//! 100 tasks gated through a mutual-exclusion semaphore (`init = 1`) and
//! another 100 ungated tasks racing it directly — grounded in
//! `original_source/examples/example8_counter_semaphore.c`. Final count:
//! 200, all of it serialized by the single physical core rather than by
//! the semaphore (the ungated half shows the semaphore isn't what keeps
//! this race-free — cooperative scheduling is).
#![allow(clippy::expect_used)]

use coco::{coco_exit, Channel, Semaphore, WaitGroup};

struct Counter {
    slot: Channel<i32, 1>,
}

impl Counter {
    fn increment(&self) {
        let curr = self.slot.extract().expect("counter channel never closes");
        coco::coco_yield();
        self.slot.send(curr + 1).expect("counter channel never closes");
    }

    fn read(&self) -> i32 {
        let val = self.slot.extract().expect("counter channel never closes");
        self.slot.send(val).expect("counter channel never closes");
        val
    }
}

struct SharedState {
    counter: Counter,
    wg: WaitGroup,
}

static SEM: Semaphore = Semaphore::new(1);

extern "C" fn gated_inc(state: *mut u8) {
    // SAFETY: `state` points at `SharedState` living on `kernel`'s stack
    // frame, which outlives every task spawned against it.
    let state = unsafe { &*(state as *const SharedState) };
    state.counter.increment();
    state.wg.done();
    SEM.post();
    coco_exit(0);
}

extern "C" fn ungated_inc(counter: *mut u8) {
    // SAFETY: `counter` points at the `Counter` embedded in `SharedState`
    // on `kernel`'s stack frame.
    let counter = unsafe { &*(counter as *const Counter) };
    counter.increment();
    coco_exit(0);
}

extern "C" fn kernel(_: *mut u8) {
    let state =
        SharedState { counter: Counter { slot: Channel::buffered() }, wg: WaitGroup::new() };
    state.counter.slot.send(0).expect("counter channel never closes");
    state.wg.add(100);

    for _ in 0..100 {
        SEM.wait();
        coco::add_task(gated_inc, &state as *const SharedState as *mut u8);
    }
    let mut ungated_tids = [coco::TaskId::NONE; 100];
    for tid in &mut ungated_tids {
        *tid = coco::add_task(ungated_inc, &state.counter as *const Counter as *mut u8);
    }

    state.wg.wait();
    let mut status = 0;
    for tid in ungated_tids {
        coco::coco_waitpid(tid, Some(&mut status), 0);
    }

    println!("{}", state.counter.read());
    coco_exit(0);
}

fn main() {
    env_logger::init();
    let status = coco::coco_start(kernel, core::ptr::null_mut());
    std::process::exit(status);
}
