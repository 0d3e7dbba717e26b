//! x86_64 context switch: callee-saved registers and a stack pointer, no
//! FPU state, no segment bases, no per-CPU bookkeeping.

use core::arch::global_asm;

/// A suspended task's resume point: just the stack pointer. Everything
/// else a task needs to resume (callee-saved registers, return address)
/// lives on the task's own stack, exactly where [`switch`] left it.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct Context {
    pub rsp: usize,
}

impl Context {
    /// Build the initial context for a task that has never run. Lays down
    /// a synthetic switch frame on `stack` (16-byte aligned, growing down
    /// from `stack_top`) so that the first [`switch`] into this context
    /// pops six zeroed callee-saved registers and `ret`s into `entry`.
    pub fn new(stack_top: usize, entry: extern "C" fn() -> !) -> Self {
        debug_assert_eq!(stack_top % 16, 0, "stack_top must be 16-byte aligned");
        // 7 qwords: rbp, rbx, r12, r13, r14, r15, return address.
        let sp = stack_top - 7 * 8;
        unsafe {
            let slots = sp as *mut usize;
            for i in 0..6 {
                slots.add(i).write(0);
            }
            slots.add(6).write(entry as usize);
        }
        Context { rsp: sp }
    }
}

unsafe extern "C" {
    /// Save the callee-saved registers and stack pointer of the running
    /// task into `*old`, then load them from `new` and return into
    /// whatever instruction follows the push sequence there (either an
    /// earlier `switch`/`fork_capture` call, or — for a task dispatched
    /// for the first time — the synthetic frame built by [`Context::new`]).
    pub fn switch(old: *mut Context, new: *const Context);

    /// Record the current stack pointer and callee-saved registers into
    /// `*out` without switching stacks, then return normally (eax cleared).
    /// Used by `fork`: a later [`switch`] into `out` resumes right after
    /// this call, on whichever stack was copied into `out`'s task slot.
    pub fn fork_capture(out: *mut Context) -> i32;

    /// Read the live stack pointer of the calling task.
    pub fn current_sp() -> usize;
}

global_asm!(
    ".global switch",
    "switch:",
    "push rbp",
    "push rbx",
    "push r12",
    "push r13",
    "push r14",
    "push r15",
    "mov [rdi], rsp",
    "mov rsp, [rsi]",
    "pop r15",
    "pop r14",
    "pop r13",
    "pop r12",
    "pop rbx",
    "pop rbp",
    "ret",
);

global_asm!(
    ".global fork_capture",
    "fork_capture:",
    "push rbp",
    "push rbx",
    "push r12",
    "push r13",
    "push r14",
    "push r15",
    "mov [rdi], rsp",
    "pop r15",
    "pop r14",
    "pop r13",
    "pop r12",
    "pop rbx",
    "pop rbp",
    "xor eax, eax",
    "ret",
);

global_asm!(
    ".global current_sp",
    "current_sp:",
    "mov rax, rsp",
    "add rax, 8", // undo the call's own return-address push
    "ret",
);
