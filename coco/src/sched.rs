//! The scheduler: task table ownership, the run loop, and every operation
//! that suspends or resumes a task (`yield`, `exit`, `fork`, `waitpid`).
//!
//! There is exactly one [`Scheduler`] per thread, reached through a
//! thread-local. It is stored behind a bare `UnsafeCell`, not a `RefCell`:
//! `fork` duplicates whatever is live on a task's stack onto a second,
//! independent stack, including any local that happens to be stack-spilled
//! at the point of the copy. A `RefCell` borrow guard spilled across that
//! point would get duplicated along with everything else, and the child's
//! copy would eventually drop it a second time, corrupting the real
//! borrow-flag cell. Nothing here actually needs the checked borrow: only
//! one task ever runs at a time (that is the whole cooperative premise),
//! so there is no concurrent access for `RefCell` to catch.

use crate::arch::{self, Context};
use crate::config::{CocoConfig, DefaultConfig};
use crate::error::CocoError;
use crate::fatal;
use crate::task::{
    cdll_insert, cdll_remove, CoroutineFn, ListHead, Signal, TaskId, TaskSlot, TaskStatus,
    DEFAULT_HANDLERS, MAX_TASKS, NUM_SIGNALS, STACK_SIZE,
};
use std::cell::UnsafeCell;
use std::time::{Duration, Instant};

/// `waitpid` option: return `TaskId::NONE` immediately instead of yielding
/// the calling task when the target hasn't exited yet.
pub const WNOHANG: u32 = 1 << 0;

thread_local! {
    static SCHED: UnsafeCell<Scheduler> = UnsafeCell::new(Scheduler::new());
}

fn sched_ptr() -> *mut Scheduler {
    SCHED.with(|cell| cell.get())
}

/// Run `f` against this thread's scheduler.
///
/// # Safety notes
/// See the module doc: access is unchecked by design. Cooperative
/// scheduling means `f` never runs re-entrantly with another call to
/// `with_sched` unless `f` itself calls back in (which none of the
/// functions below do).
pub(crate) fn with_sched<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    let ptr = sched_ptr();
    // SAFETY: single-threaded, non-reentrant access; see module docs.
    f(unsafe { &mut *ptr })
}

/// Run `f` against the scheduler and the task id of whichever task is
/// currently executing (`TaskId::NONE` if called from outside any task,
/// e.g. from `coco_start`'s own driving loop).
pub fn with_current<R>(f: impl FnOnce(&mut Scheduler, TaskId) -> R) -> R {
    with_sched(|s| {
        let tid = s.current;
        f(s, tid)
    })
}

/// The scheduler's full state: the task table and the three queues that
/// thread through it.
///
/// `tasks` is a genuine fixed-size array, not a `Vec` or boxed slice: the
/// table itself never grows, shrinks, or reallocates after
/// `Scheduler::new` returns, matching the static `task_struct tasks[...]`
/// table in `original_source/coco/coco.c` and this crate's own
/// no-heap-task-table design.
pub struct Scheduler {
    tasks: [TaskSlot; MAX_TASKS + 1],
    free: ListHead,
    running: ListHead,
    dpcs: ListHead,
    current: TaskId,
    can_yield: bool,
}

enum QueueKind {
    Running,
    Dpc,
}

impl Scheduler {
    fn new() -> Scheduler {
        let mut tasks = [TaskSlot::empty(); MAX_TASKS + 1];
        let mut free = ListHead::empty();
        for i in (1..=MAX_TASKS).rev() {
            cdll_insert(&mut free, &mut tasks, i);
        }
        Scheduler {
            tasks,
            free,
            running: ListHead::empty(),
            dpcs: ListHead::empty(),
            current: TaskId::NONE,
            can_yield: true,
        }
    }

    fn queue_of(&mut self, tid: usize) -> &mut ListHead {
        if self.tasks[tid].in_dpc {
            &mut self.dpcs
        } else {
            &mut self.running
        }
    }

    fn alloc_slot(&mut self, func: CoroutineFn, args: *mut u8, kind: QueueKind) -> TaskId {
        if self.free.is_empty() {
            log::warn!("coco: task table full, refusing to add task");
            return TaskId::NONE;
        }
        let tid = self.free.next;
        cdll_remove(&mut self.free, &mut self.tasks, tid);

        self.tasks[tid] = TaskSlot::empty();
        self.tasks[tid].status = TaskStatus::New;
        self.tasks[tid].entry_fn = Some(func);
        self.tasks[tid].args = args;
        self.tasks[tid].handlers = DEFAULT_HANDLERS;

        match kind {
            QueueKind::Running => {
                self.tasks[tid].in_dpc = false;
                cdll_insert(&mut self.running, &mut self.tasks, tid);
            }
            QueueKind::Dpc => {
                self.tasks[tid].in_dpc = true;
                self.tasks[tid].detached = true;
                cdll_insert(&mut self.dpcs, &mut self.tasks, tid);
            }
        }
        log::debug!("coco: allocated task {tid}");
        TaskId(tid)
    }

    /// Add a normal task to the running queue.
    pub fn add_task(&mut self, func: CoroutineFn, args: *mut u8) -> TaskId {
        self.alloc_slot(func, args, QueueKind::Running)
    }

    /// Add a deferred procedure call: runs to exhaustion ahead of every
    /// normal task on each scheduler pass, detached, never waited on.
    pub fn add_dpc(&mut self, func: CoroutineFn, args: *mut u8) -> TaskId {
        self.alloc_slot(func, args, QueueKind::Dpc)
    }

    fn stack_top(&self, tid: usize) -> usize {
        let base = self.tasks[tid].stack.as_ptr() as usize;
        (base + STACK_SIZE) & !0xf
    }

    /// Dispatch into `tid`, whatever its current resume point, and return
    /// once it has yielded, stopped, or exited. `tasks[tid].status` reflects
    /// the new state by the time this returns — the task itself writes it
    /// just before switching back out.
    fn dispatch(&mut self, tid: usize) {
        let prev_current = self.current;
        self.current = TaskId(tid);
        let caller_ptr: *mut Context = &mut self.tasks[tid].caller_ctx;
        let resume_ptr: *const Context = &self.tasks[tid].resume_ctx;
        // SAFETY: both contexts belong to a live slot with its own
        // dedicated stack; `resume_ptr` was set either by `Context::new`
        // (never-run task) or by a previous `park` (suspended task).
        unsafe { arch::switch(caller_ptr, resume_ptr) };
        self.current = prev_current;
    }

    fn start_task(&mut self, tid: usize) {
        let top = self.stack_top(tid);
        self.tasks[tid].resume_ctx = Context::new(top, task_trampoline);
        self.dispatch(tid);
    }

    /// One pass over the running queue: every `New` task gets its first
    /// dispatch, every `Yielding` task gets resumed, `Stopped` tasks are
    /// skipped unless `SIGCONT` is pending for them (in which case they're
    /// resumed like any other yielding task, and the pending signal is what
    /// clears the stop once delivered). The DPC queue is drained to
    /// exhaustion between every single task step.
    fn run_tasks_once(&mut self) {
        let mut t = self.running.next;
        while t != 0 {
            let next = self.tasks[t].next;
            self.run_dpcs();
            match self.tasks[t].status {
                TaskStatus::New => self.start_task(t),
                TaskStatus::Yielding => self.dispatch(t),
                TaskStatus::Stopped => {
                    if self.tasks[t].sig_pending & sig_bit(Signal::SigCont) != 0 {
                        self.dispatch(t);
                    }
                }
                TaskStatus::Done | TaskStatus::Free => {}
            }
            t = next;
        }
    }

    fn run_dpcs(&mut self) {
        loop {
            let d = self.dpcs.next;
            if d == 0 {
                return;
            }
            match self.tasks[d].status {
                TaskStatus::New => self.start_task(d),
                TaskStatus::Yielding => self.dispatch(d),
                _ => {}
            }
            if self.tasks[d].status != TaskStatus::Yielding
                && self.tasks[d].status != TaskStatus::New
            {
                // exited or was reclaimed by `exit`'s detached path already
            }
            // A DPC that hasn't reached Free yet but also isn't making
            // progress (e.g. parked waiting on a channel) would spin here
            // forever; DPCs are expected to run to completion without
            // blocking on anything but other DPCs.
            if self.dpcs.next == d {
                break;
            }
        }
    }

    fn unlink_current(&mut self, tid: usize) {
        let in_dpc = self.tasks[tid].in_dpc;
        if in_dpc {
            cdll_remove(&mut self.dpcs, &mut self.tasks, tid);
        } else {
            cdll_remove(&mut self.running, &mut self.tasks, tid);
        }
    }

    /// Suspend the current task: save its context, jump back to whatever
    /// dispatched it, and — once resumed — deliver any signals that
    /// accumulated while it was parked.
    fn park(&mut self, tid: usize) {
        self.dispatch_out(tid);
        self.tasks[tid].status = TaskStatus::Yielding;
        self.dispatch_signals(tid);
    }

    fn dispatch_out(&mut self, tid: usize) {
        let resume_ptr: *mut Context = &mut self.tasks[tid].resume_ctx;
        let caller_ptr: *const Context = &self.tasks[tid].caller_ctx;
        // SAFETY: called only from within the task's own running context,
        // jumping back to whatever called `dispatch` for this slot.
        unsafe { arch::switch(resume_ptr, caller_ptr) };
    }

    fn dispatch_signals(&mut self, tid: usize) {
        let pending = self.tasks[tid].sig_pending;
        if pending == 0 {
            return;
        }
        let was_stopped = pending & sig_bit(Signal::SigStp) != 0;
        self.can_yield = false;
        for sig in Signal::ALL {
            let bit = sig_bit(sig);
            if self.tasks[tid].sig_pending & bit != 0 {
                self.tasks[tid].sig_pending &= !bit;
                let handler = self.tasks[tid].handlers[sig as usize];
                handler();
            }
        }
        self.can_yield = true;
        if was_stopped {
            self.tasks[tid].status = TaskStatus::Stopped;
            self.park(tid);
        }
    }

    /// Suspend the current task until the next scheduler pass.
    pub fn yield_now(&mut self) {
        let tid = self.current.0;
        if !self.can_yield {
            fatal!(CocoError::YieldOutsideContext);
        }
        self.tasks[tid].status = TaskStatus::Yielding;
        self.park(tid);
    }

    /// Suspend the current task in a spin-yield loop until at least `ms`
    /// milliseconds have elapsed.
    pub fn yield_for_ms(&mut self, ms: u32) {
        let tid = self.current.0;
        self.tasks[tid].wait_start = Instant::now();
        let budget = Duration::from_millis(u64::from(ms));
        loop {
            self.yield_now();
            if self.tasks[tid].wait_start.elapsed() >= budget {
                return;
            }
        }
    }

    /// Mark the current task detached: once it exits, its slot is freed
    /// immediately rather than waiting for `waitpid`.
    pub fn detach_current(&mut self) {
        let tid = self.current.0;
        self.tasks[tid].detached = true;
    }

    /// Exit the current task with `status`. Never returns — the task's
    /// stack is abandoned the instant this switches back to the scheduler.
    pub fn exit(&mut self, tid: TaskId, status: i32) -> ! {
        let tid = tid.0;
        self.tasks[tid].exit_status = status;
        self.unlink_current(tid);
        if self.tasks[tid].detached {
            self.tasks[tid].status = TaskStatus::Free;
            cdll_insert(&mut self.free, &mut self.tasks, tid);
        } else {
            self.tasks[tid].status = TaskStatus::Done;
        }
        log::debug!("coco: task {tid} exiting with status {status}");
        self.dispatch_out(tid);
        fatal!(CocoError::EntryReturned { tid });
    }

    /// Wait for `target` to exit. Blocks (yielding the caller) unless
    /// `opts` has [`WNOHANG`] set. Returns `TaskId::NONE` if the wait
    /// would block under `WNOHANG`, otherwise `target` once reaped.
    pub fn waitpid(&mut self, target: TaskId, exit_status: &mut i32, opts: u32) -> TaskId {
        loop {
            if self.tasks[target.0].status == TaskStatus::Done {
                *exit_status = self.tasks[target.0].exit_status;
                self.tasks[target.0].status = TaskStatus::Free;
                cdll_insert(&mut self.free, &mut self.tasks, target.0);
                return target;
            }
            if opts & WNOHANG != 0 {
                return TaskId::NONE;
            }
            self.yield_now();
        }
    }

    /// Fork the current task. Returns `TaskId::NONE` to both parent and
    /// child, mirroring the convention fork callers actually use here: the
    /// parent distinguishes itself from the child by the returned id being
    /// non-`NONE` only in the parent.
    pub fn fork(&mut self) -> TaskId {
        let parent_tid = self.current.0;

        let mut saved = Context::default();
        // SAFETY: captures the live stack pointer and callee-saved
        // registers without switching away; returns normally twice (once
        // here, once later when the copied stack is dispatched).
        unsafe { arch::fork_capture(&mut saved) };

        if self.current.0 != parent_tid {
            // We're the resumed child: the scheduler set `current` to our
            // own id before dispatching into this exact point.
            return TaskId::NONE;
        }

        if self.free.is_empty() {
            log::warn!("coco: fork: task table full");
            return TaskId::NONE;
        }
        let child_tid = self.free.next;
        cdll_remove(&mut self.free, &mut self.tasks, child_tid);

        let parent_base = self.tasks[parent_tid].stack.as_ptr() as isize;
        self.tasks[child_tid] = self.tasks[parent_tid];
        self.tasks[child_tid].next = 0;
        self.tasks[child_tid].prev = 0;
        self.tasks[child_tid].in_dpc = false;
        self.tasks[child_tid].detached = self.tasks[parent_tid].detached;

        let child_base = self.tasks[child_tid].stack.as_ptr() as isize;
        let delta = child_base - parent_base;

        rebase_frame_chain(&mut self.tasks[child_tid].stack, parent_base, delta, saved.rsp as isize);

        self.tasks[child_tid].resume_ctx = Context {
            rsp: (saved.rsp as isize + delta) as usize,
        };
        self.tasks[child_tid].caller_ctx = Context::default();
        self.tasks[child_tid].status = TaskStatus::Yielding;
        cdll_insert(&mut self.running, &mut self.tasks, child_tid);

        log::debug!("coco: fork parent={parent_tid} child={child_tid}");
        TaskId(child_tid)
    }

    pub(crate) fn signal_pending_mut(&mut self, tid: usize) -> &mut u32 {
        &mut self.tasks[tid].sig_pending
    }

    pub(crate) fn handler_slot_mut(&mut self, tid: usize, sig: Signal) -> &mut crate::task::SignalHandler {
        &mut self.tasks[tid].handlers[sig as usize]
    }

    pub(crate) fn task_exists(&self, tid: usize) -> bool {
        tid >= 1 && tid <= MAX_TASKS && self.tasks[tid].status != TaskStatus::Free
    }

    /// Raise `sig` against `tid`. Safe to call from any task, including
    /// against itself — delivery happens later, the next time `tid`
    /// resumes after a yield. A `tid` that no longer names a live task
    /// (already reaped, or never allocated) is silently ignored: `kill`
    /// racing a task's exit is a normal, non-fatal occurrence.
    pub fn kill(&mut self, tid: TaskId, sig: Signal) {
        if !self.task_exists(tid.0) {
            return;
        }
        *self.signal_pending_mut(tid.0) |= sig_bit(sig);
        log::debug!("coco: kill: signal {sig:?} queued for task {}", tid.0);
    }

    /// Install `handler` for `sig` on the *currently executing* task.
    /// An out-of-range signal number has no representation once `Signal`
    /// is a closed enum, so this always succeeds; the `Result` return
    /// type is kept so the call site still has a place to check.
    pub fn sigaction(&mut self, sig: Signal, handler: crate::task::SignalHandler) -> Result<(), ()> {
        let tid = self.current.0;
        *self.handler_slot_mut(tid, sig) = handler;
        Ok(())
    }

    /// Run `kernel` as the root task, draining DPCs and the running queue
    /// until it exits, and return its exit status.
    pub fn start(&mut self, kernel: CoroutineFn, args: *mut u8) -> i32 {
        let kernel_tid = self.add_task(kernel, args);
        if kernel_tid.is_none() {
            fatal!(CocoError::TableFull);
        }
        let mut status = 0;
        loop {
            let done = self.waitpid(kernel_tid, &mut status, WNOHANG);
            if !done.is_none() {
                return status;
            }
            self.run_tasks_once();
        }
    }
}

fn sig_bit(sig: Signal) -> u32 {
    1u32 << (sig as usize)
}

/// Walk the saved frame-pointer chain baked into `child_stack` (a byte-for-
/// byte copy of the parent's stack) and rebase every link that still points
/// back into the parent's own stack range, so the chain reads correctly
/// from the child's separate memory.
///
/// `switch`/`fork_capture` push `rbp` first among the callee-saved
/// registers, at offset 40 from the captured `rsp` (five more pushes
/// follow below it); that's the address of the first saved frame pointer
/// to rebase.
fn rebase_frame_chain(child_stack: &mut [u8; STACK_SIZE], parent_base: isize, delta: isize, parent_saved_rsp: isize) {
    let parent_top = parent_base + STACK_SIZE as isize;
    let in_range = |addr: isize| addr >= parent_base && addr + 8 <= parent_top;

    let mut fp_addr = parent_saved_rsp + 40;
    let mut frames = 0usize;
    while in_range(fp_addr) && frames < <DefaultConfig as CocoConfig>::MAX_FORK_REBASE_FRAMES {
        let off = (fp_addr - parent_base) as usize;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&child_stack[off..off + 8]);
        let saved_rbp = isize::from_ne_bytes(bytes);
        if saved_rbp == 0 || !in_range(saved_rbp) {
            break;
        }
        let rebased = (saved_rbp + delta) as usize;
        child_stack[off..off + 8].copy_from_slice(&rebased.to_ne_bytes());
        fp_addr = saved_rbp;
        frames += 1;
    }
}

/// Where every task's execution actually begins. Reads its own entry
/// function and argument pointer out of the task table and runs it. A
/// task is expected to call `coco_exit` itself; one that merely returns is
/// exited with status 0 on its behalf, matching `debug_assert!` rather
/// than a hard failure — the same leniency the signal handlers extend.
extern "C" fn task_trampoline() -> ! {
    let (entry, args, tid) = with_current(|sched, tid| {
        let t = &sched.tasks[tid.0];
        let entry = match t.entry_fn {
            Some(entry) => entry,
            None => fatal!(CocoError::MissingEntryFn { tid: tid.0 }),
        };
        (entry, t.args, tid)
    });
    entry(args);
    debug_assert!(false, "task {tid:?} returned instead of calling coco_exit");
    log::debug!("coco: task {tid:?} returned without exiting, exiting it with status 0");
    with_sched(|sched| sched.exit(tid, 0));
}
