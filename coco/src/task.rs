//! The task table: per-task state, the circular doubly linked list used
//! for the free/running/DPC queues, and task identifiers.
//!
//! The free/running/DPC queues are circular doubly linked lists threaded
//! through the static task array by index rather than by pointer, which
//! sidesteps a self-referential struct.

use crate::arch::Context;
use crate::config::{CocoConfig, DefaultConfig};
use std::time::Instant;

/// Number of signals the crate knows about; see [`Signal`].
pub const NUM_SIGNALS: usize = 3;

/// Entry point for a task or DPC: `extern "C" fn(args: *mut u8)`, mirroring
/// the `coroutine` typedef in `coco.h`. Must never return — if it does,
/// the scheduler treats that as [`crate::error::CocoError::EntryReturned`].
pub type CoroutineFn = extern "C" fn(*mut u8);

/// A signal handler, installed per task per signal via `coco_sigaction`.
/// Runs synchronously on the signaled task's own stack with `can_yield`
/// cleared — it must not call anything that yields.
pub type SignalHandler = fn();

/// The three signals this runtime knows about. `NUM_SIGNALS` is this enum's
/// cardinality, kept in sync by hand since Rust enums don't expose a
/// `COUNT` variant the way a C `enum sig { ..., NUM_SIGNALS }` trick does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Signal {
    SigInt = 0,
    SigStp = 1,
    SigCont = 2,
}

impl Signal {
    pub const ALL: [Signal; NUM_SIGNALS] = [Signal::SigInt, Signal::SigStp, Signal::SigCont];

    pub fn from_index(i: usize) -> Option<Signal> {
        match i {
            0 => Some(Signal::SigInt),
            1 => Some(Signal::SigStp),
            2 => Some(Signal::SigCont),
            _ => None,
        }
    }
}

/// A task identifier: an index into the task table. `TaskId::NONE` (zero)
/// means "no task" and doubles as the sentinel value for the intrusive
/// list heads below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub usize);

impl TaskId {
    pub const NONE: TaskId = TaskId(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Status of a task not currently executing. The currently-running task is
/// tracked separately by the scheduler rather than stored here: while a
/// task executes, its status field still holds whatever it was dispatched
/// with, and only changes when the task itself yields, stops, or exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Free,
    Done,
    Yielding,
    Stopped,
    New,
}

/// One slot of the static task table.
///
/// No heap allocation: the stack is an inline byte array, and the free/
/// running/DPC queues are expressed via the `next`/`prev` index fields
/// rather than `Box`ed list nodes.
#[derive(Clone, Copy)]
pub struct TaskSlot {
    pub status: TaskStatus,
    /// The task's own saved resume point — where the scheduler jumps to
    /// dispatch or redispatch this task.
    pub resume_ctx: Context,
    /// Where this task jumps back to on yield/exit: the scheduler's own
    /// context at the moment it dispatched this task. Reset on every
    /// dispatch, so it only ever needs to hold one outstanding resume
    /// point per task.
    pub caller_ctx: Context,
    pub entry_fn: Option<CoroutineFn>,
    pub args: *mut u8,
    pub sig_pending: u32,
    pub handlers: [SignalHandler; NUM_SIGNALS],
    pub wait_start: Instant,
    pub exit_status: i32,
    pub detached: bool,
    /// Which queue this slot is currently linked into: the DPC queue if
    /// true, the running queue otherwise. Lets `exit` unlink a task from
    /// the right list without the scheduler having to track it elsewhere.
    pub in_dpc: bool,
    /// Dedicated stack for this task. `STACK_SIZE` bytes, growing down.
    pub stack: [u8; STACK_SIZE],
    pub next: usize,
    pub prev: usize,
}

/// Default handler for `SIGINT`: exit with status 1.
pub fn default_sigint() {
    crate::sched::with_current(|sched, tid| sched.exit(tid, 1));
}

/// Default handler for `SIGSTP`: no-op (the stop transition itself is
/// handled by the dispatcher, not by the handler).
pub fn default_sigstp() {}

/// Default handler for `SIGCONT`: no-op.
pub fn default_sigcont() {}

pub const DEFAULT_HANDLERS: [SignalHandler; NUM_SIGNALS] =
    [default_sigint, default_sigstp, default_sigcont];

/// Table size and per-task stack budget, taken from [`DefaultConfig`].
/// Plugging in a different [`CocoConfig`] means building against a
/// different pair of consts — see the note in `config.rs` on why this
/// isn't threaded through as a generic parameter.
pub const MAX_TASKS: usize = <DefaultConfig as CocoConfig>::MAX_TASKS;
pub const STACK_SIZE: usize = <DefaultConfig as CocoConfig>::STACK_SIZE;

impl TaskSlot {
    pub fn empty() -> TaskSlot {
        TaskSlot {
            status: TaskStatus::Free,
            resume_ctx: Context { rsp: 0 },
            caller_ctx: Context { rsp: 0 },
            entry_fn: None,
            args: core::ptr::null_mut(),
            sig_pending: 0,
            handlers: DEFAULT_HANDLERS,
            wait_start: Instant::now(),
            exit_status: 0,
            detached: false,
            in_dpc: false,
            stack: [0u8; STACK_SIZE],
            next: 0,
            prev: 0,
        }
    }
}

/// Anchor of a circular doubly linked intrusive list. `next == 0` (or
/// equivalently `prev == 0`) means the list is empty — index 0 is never a
/// real task, so it safely doubles as "points back to the sentinel" without
/// needing a whole spare `TaskSlot` to act as one.
#[derive(Debug, Clone, Copy)]
pub struct ListHead {
    pub next: usize,
    pub prev: usize,
}

impl ListHead {
    pub const fn empty() -> ListHead {
        ListHead { next: 0, prev: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.next == 0
    }
}

/// Insert `node` at the front of `list`.
pub fn cdll_insert(list: &mut ListHead, tasks: &mut [TaskSlot], node: usize) {
    let old_first = list.next;
    tasks[node].next = old_first;
    tasks[node].prev = 0;
    if old_first != 0 {
        tasks[old_first].prev = node;
    } else {
        list.prev = node;
    }
    list.next = node;
}

/// Remove `node` from whichever list it is currently linked into.
pub fn cdll_remove(list: &mut ListHead, tasks: &mut [TaskSlot], node: usize) {
    let (prev, next) = (tasks[node].prev, tasks[node].next);
    if prev != 0 {
        tasks[prev].next = next;
    } else {
        list.next = next;
    }
    if next != 0 {
        tasks[next].prev = prev;
    } else {
        list.prev = prev;
    }
    tasks[node].next = 0;
    tasks[node].prev = 0;
}
