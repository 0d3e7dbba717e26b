//! Compile-time configuration for the scheduler.
//!
//! Table size and per-task stack budget are expressed as a trait with
//! associated consts rather than crate-level consts, so an embedder who
//! wants a different table size or stack budget implements [`CocoConfig`]
//! themselves instead of editing crate source.

/// Tunables for a [`crate::sched::Scheduler`] instance.
pub trait CocoConfig {
    /// Size of the static task table. Slot 0 is reserved as "no task", so
    /// up to `MAX_TASKS` tasks can be live at once.
    const MAX_TASKS: usize;

    /// Bytes of dedicated stack given to each task slot. Every task,
    /// including DPCs, gets its own `STACK_SIZE`-byte stack carved out of
    /// the static task table — no heap allocation.
    const STACK_SIZE: usize;

    /// Upper bound on frames walked while rebasing the saved frame-pointer
    /// chain during [`crate::sched::Scheduler::fork`]. Bounds an otherwise
    /// unbounded walk if the chain never re-enters the task's own stack
    /// range (for example, frame pointers were compiled out).
    const MAX_FORK_REBASE_FRAMES: usize;
}

/// The defaults this runtime ships with: 256 tasks, 4 KiB of stack per
/// task, and a generous bound on the fork frame-rebase walk.
pub struct DefaultConfig;

impl CocoConfig for DefaultConfig {
    const MAX_TASKS: usize = 256;
    const STACK_SIZE: usize = 1 << 12;
    const MAX_FORK_REBASE_FRAMES: usize = 4096;
}
