//! Architecture-specific context switch primitives.
//!
//! A [`Context`] carries only the callee-saved register set and stack
//! pointer of a suspended task. That's all a cooperative, kernel-mode-only
//! switch between single-core tasks needs to save — no FPU state, no TLS,
//! no per-CPU bookkeeping.

#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(target_arch = "x86_64")]
pub use self::x86_64::{fork_capture, switch, Context};

#[cfg(not(target_arch = "x86_64"))]
compile_error!("coco's stackful context switch is only implemented for x86_64; port arch/x86_64.rs to add a target");
