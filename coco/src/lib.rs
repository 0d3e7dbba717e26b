//! `coco` — a tiny cooperative multitasking runtime for single-core hosted
//! or embedded targets: a fixed task table, `fork`/`waitpid`/`kill`, and
//! Go-style channels, wait groups, and semaphores, all driven by explicit
//! yield points. Only one task ever executes at a time; there is no
//! preemption and no OS thread is spawned on the runtime's behalf.
//!
//! Grounded in Eric Breyer's `coco` (see `original_source/` in this
//! crate's retrieval pack), rebuilt around stackful coroutines — each
//! task gets its own fixed-size stack and a real context switch — instead
//! of the original's shared-stack save/restore around `setjmp`/`longjmp`.
//!
//! Start a runtime with [`coco_start`], spawn tasks with [`add_task`], and
//! have them call back into [`coco_yield`] (directly, or indirectly
//! through [`channel::Channel`], [`wg::WaitGroup`], or [`sem::Semaphore`])
//! at every point they're willing to give another task a turn.

pub mod arch;
pub mod channel;
pub mod config;
pub mod error;
pub mod sched;
pub mod sem;
pub mod task;
pub mod wg;

pub use channel::{chan_select, Channel, ChannelOps};
pub use config::{CocoConfig, DefaultConfig};
pub use error::{ChannelStatus, CocoError};
pub use sched::WNOHANG;
pub use sem::Semaphore;
pub use task::{CoroutineFn, Signal, SignalHandler, TaskId, TaskStatus, NUM_SIGNALS};
pub use wg::WaitGroup;

/// Initialize the task table, add `kernel` as the first (kernel) task,
/// and drive the scheduler — running every `New`/`Yielding` task in turn
/// and draining the DPC queue between each step — until the kernel task
/// exits. Returns the kernel task's exit status.
pub fn coco_start(kernel: CoroutineFn, args: *mut u8) -> i32 {
    sched::with_sched(|s| s.start(kernel, args))
}

/// Add a normal task to the run queue. Returns `TaskId::NONE` if the task
/// table is full.
pub fn add_task(entry: CoroutineFn, args: *mut u8) -> TaskId {
    sched::with_sched(|s| s.add_task(entry, args))
}

/// Add a deferred procedure call: detached, drained to exhaustion ahead of
/// every normal task on each scheduler pass. Returns `TaskId::NONE` if the
/// task table is full.
pub fn add_dpc(entry: CoroutineFn, args: *mut u8) -> TaskId {
    sched::with_sched(|s| s.add_dpc(entry, args))
}

/// Suspend the calling task until the scheduler's next pass.
pub fn coco_yield() {
    sched::with_sched(sched::Scheduler::yield_now);
}

/// Suspend the calling task in a spin-yield loop until at least `ms`
/// milliseconds have elapsed. Never blocks a thread — every iteration is
/// a real `coco_yield`.
pub fn yield_for_ms(ms: u32) {
    sched::with_sched(|s| s.yield_for_ms(ms));
}

/// As [`yield_for_ms`], in whole seconds.
pub fn yield_for_s(s: u32) {
    yield_for_ms(s.saturating_mul(1000));
}

/// Exit the calling task with `status`. Never returns.
pub fn coco_exit(status: i32) -> ! {
    sched::with_current(|s, tid| s.exit(tid, status))
}

/// Mark the calling task detached: its slot is reclaimed automatically on
/// exit instead of waiting for a `coco_waitpid` reap.
pub fn coco_detach() {
    sched::with_sched(sched::Scheduler::detach_current);
}

/// Fork the calling task. Returns `TaskId::NONE` in the child; a valid,
/// distinct `TaskId` in the parent (or `TaskId::NONE` if the table was
/// full and no child could be created).
pub fn coco_fork() -> TaskId {
    sched::with_sched(sched::Scheduler::fork)
}

/// Wait for `tid` to exit and reap its slot, writing its exit status into
/// `exit_status` (if given). With `WNOHANG` set in `opts`, returns
/// `TaskId::NONE` immediately instead of yielding when `tid` hasn't
/// exited yet; otherwise returns `TaskId::NONE` only if `tid` doesn't
/// name a task that will ever become reapable.
pub fn coco_waitpid(tid: TaskId, exit_status: Option<&mut i32>, opts: u32) -> TaskId {
    let mut discard = 0;
    let out = exit_status.unwrap_or(&mut discard);
    sched::with_sched(|s| s.waitpid(tid, out, opts))
}

/// Queue `sig` for delivery to `tid` the next time it resumes after a
/// yield. Safe to call against any task, including one that hasn't run
/// yet or has already exited (a no-op in the latter case).
pub fn coco_kill(tid: TaskId, sig: Signal) {
    sched::with_sched(|s| s.kill(tid, sig));
}

/// Install `handler` for `sig` on the calling task.
pub fn coco_sigaction(sig: Signal, handler: SignalHandler) -> Result<(), ()> {
    sched::with_sched(|s| s.sigaction(sig, handler))
}
