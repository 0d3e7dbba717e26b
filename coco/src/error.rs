//! Error types for channel transactions and fatal runtime conditions.
//!
//! Small, `Display`-able, `core::error::Error`-implementing enums rather
//! than raw integers, one per subsystem.

use core::fmt;

/// The outcome of a channel transaction (`send`/`extract`/`status`).
///
/// Mirrors `enum channel_status` from `channel.h` field for field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Transaction completed normally.
    Okay,
    /// Buffered channel is at capacity.
    Full,
    /// Buffered channel has nothing queued.
    Empty,
    /// Buffered channel is closed but still draining queued elements.
    ReadOnly,
    /// Channel is closed and, for a buffered channel, drained.
    Closed,
    /// Unbuffered channel with neither side currently waiting.
    Unbuff,
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelStatus::Okay => "okay",
            ChannelStatus::Full => "full",
            ChannelStatus::Empty => "empty",
            ChannelStatus::ReadOnly => "read-only (closed, draining)",
            ChannelStatus::Closed => "closed",
            ChannelStatus::Unbuff => "unbuffered, no rendezvous pending",
        };
        f.write_str(s)
    }
}

impl core::error::Error for ChannelStatus {}

/// Fatal runtime conditions. These are bugs in the embedding program, not
/// recoverable errors — callers never see a `Result<_, CocoError>`; the
/// crate aborts via [`crate::fatal`] instead. The type exists so the abort
/// path has a single, loggable, `Display`-able payload.
#[derive(Debug, Clone, Copy)]
pub enum CocoError {
    /// A task's live stack exceeded its configured budget.
    StackOverflow {
        tid: usize,
        needed: usize,
        budget: usize,
    },
    /// A yield primitive was called with `can_yield` false (inside a
    /// signal handler).
    YieldOutsideContext,
    /// A task's entry function returned instead of calling `coco_exit`.
    EntryReturned { tid: usize },
    /// The scheduler dispatched a slot with no `entry_fn` set: a bug in
    /// `add_task`/`add_dpc`/`fork`'s bookkeeping, not a caller-reachable
    /// condition.
    MissingEntryFn { tid: usize },
    /// The task table is full and no free slot could be allocated where
    /// the caller required one (used only by internal assertions; the
    /// public `add_task`/`fork` surface reports this as `TaskId::NONE`
    /// instead of a fatal error).
    TableFull,
}

impl fmt::Display for CocoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CocoError::StackOverflow { tid, needed, budget } => write!(
                f,
                "task {tid}: stack usage {needed} bytes exceeds STACK_SIZE budget of {budget} bytes"
            ),
            CocoError::YieldOutsideContext => {
                f.write_str("attempted to yield while can_yield is false (inside a signal handler)")
            }
            CocoError::EntryReturned { tid } => {
                write!(f, "task {tid}'s entry function returned instead of calling coco_exit")
            }
            CocoError::MissingEntryFn { tid } => {
                write!(f, "task {tid} was dispatched with no entry function set")
            }
            CocoError::TableFull => f.write_str("task table exhausted"),
        }
    }
}

impl core::error::Error for CocoError {}

/// Log the condition at `error!` and abort the process.
///
/// The Rust analogue of the C source's `assert(false && "...")`: these
/// conditions are bugs in the embedding program, not recoverable errors.
#[macro_export]
macro_rules! fatal {
    ($err:expr) => {{
        let e: $crate::error::CocoError = $err;
        log::error!("coco: fatal: {e}");
        panic!("coco: fatal: {e}");
    }};
}
