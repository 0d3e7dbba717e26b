//! Generic FIFO channels: a buffered ring-buffer variant and an unbuffered
//! rendezvous variant, behind one `Channel<T, CAP>` type.
//!
//! `CAP == 0` selects the rendezvous variant at construction (`unbuffered`
//! is only implemented for `Channel<T, 0>`); any `CAP >= 1` is a ring
//! buffer. This replaces the `INCLUDE_CHANNEL(T)`/`INCLUDE_SIZED_CHANNEL`
//! macro family from `channel.h` with one generic type, per the
//! re-architecture note on macro-generated generics.

use core::cell::Cell;
use core::mem::MaybeUninit;

use crate::error::ChannelStatus;
use crate::sched;

enum Inner<T, const CAP: usize> {
    Buffered {
        buf: [MaybeUninit<T>; CAP],
        head: usize,
        count: usize,
        closed: bool,
    },
    Unbuffered {
        slot: MaybeUninit<T>,
        reader_waiting: u32,
        writer_waiting: u32,
        sync_done: bool,
        closed: bool,
    },
}

/// A FIFO channel carrying `T`, shared by reference between tasks (passed
/// the way the C examples pass a channel embedded in a task's `args`
/// struct: by pointer, never copied).
///
/// Interior mutability follows the same reasoning as
/// [`crate::sched::Scheduler`]: exactly one task runs at a time, so a
/// bare `UnsafeCell` needs no lock. The one rule every method here obeys
/// is never holding the dereferenced `&mut Inner` across a call that may
/// yield — yielding hands control to another task, which may call back
/// into this same channel and take out its own `&mut Inner` on the same
/// memory.
pub struct Channel<T, const CAP: usize> {
    inner: core::cell::UnsafeCell<Inner<T, CAP>>,
    read_ready: Cell<bool>,
    write_ready: Cell<bool>,
}

impl<T, const CAP: usize> Channel<T, CAP> {
    /// A ring-buffer channel of capacity `CAP`. `CAP` must be at least 1;
    /// use [`Channel::unbuffered`] (only defined for `CAP == 0`) for a
    /// rendezvous channel instead.
    pub fn buffered() -> Self {
        debug_assert!(CAP >= 1, "buffered channel needs a capacity of at least 1");
        Channel {
            inner: core::cell::UnsafeCell::new(Inner::Buffered {
                buf: [(); CAP].map(|()| MaybeUninit::uninit()),
                head: 0,
                count: 0,
                closed: false,
            }),
            read_ready: Cell::new(false),
            write_ready: Cell::new(false),
        }
    }

    // SAFETY: see the struct doc — never held live across a yield.
    #[allow(clippy::mut_from_ref)]
    unsafe fn inner(&self) -> &mut Inner<T, CAP> {
        unsafe { &mut *self.inner.get() }
    }

    /// Mark the channel closed. Subsequent `send`s fail with `Closed`;
    /// `extract` keeps draining whatever is already queued, then reports
    /// `Closed` once empty.
    pub fn close(&self) {
        // SAFETY: single field write, not held across a yield.
        unsafe {
            match self.inner() {
                Inner::Buffered { closed, .. } | Inner::Unbuffered { closed, .. } => {
                    *closed = true;
                }
            }
        }
        log::debug!("coco: channel closed");
    }

    pub fn closed(&self) -> bool {
        // SAFETY: single field read, not held across a yield.
        unsafe {
            match self.inner() {
                Inner::Buffered { closed, .. } | Inner::Unbuffered { closed, .. } => *closed,
            }
        }
    }

    /// Send `data`. Blocks (yielding the caller) while the buffered
    /// channel is full, or until a reader is waiting on the unbuffered
    /// variant. Fails immediately with `Closed` if the channel has
    /// already been closed.
    pub fn send(&self, data: T) -> Result<(), ChannelStatus> {
        let mut data = Some(data);
        loop {
            // SAFETY: scoped to this block, not held across the `yield` below.
            let step = unsafe {
                match self.inner() {
                    Inner::Buffered { closed, .. } if *closed => SendStep::Done(Err(ChannelStatus::Closed)),
                    Inner::Buffered { count, .. } if *count == CAP => SendStep::Retry,
                    Inner::Buffered { buf, head, count, .. } => {
                        let idx = (*head + *count) % CAP;
                        let value = match data.take() {
                            Some(value) => value,
                            None => unreachable!("send: data consumed exactly once"),
                        };
                        buf[idx] = MaybeUninit::new(value);
                        *count += 1;
                        SendStep::Done(Ok(()))
                    }
                    Inner::Unbuffered { .. } => SendStep::Unbuffered,
                }
            };
            match step {
                SendStep::Done(result) => return result,
                SendStep::Retry => {
                    sched::with_sched(crate::sched::Scheduler::yield_now);
                    continue;
                }
                SendStep::Unbuffered => {
                    let value = match data.take() {
                        Some(value) => value,
                        None => unreachable!("send: data consumed exactly once"),
                    };
                    return self.send_unbuffered(value);
                }
            }
        }
    }

    fn send_unbuffered(&self, data: T) -> Result<(), ChannelStatus> {
        // Register as a waiting writer; bail out immediately if already closed.
        // SAFETY: scoped, not held across a yield.
        unsafe {
            match self.inner() {
                Inner::Unbuffered { closed, .. } if *closed => return Err(ChannelStatus::Closed),
                Inner::Unbuffered { writer_waiting, .. } => *writer_waiting += 1,
                Inner::Buffered { .. } => unreachable!("variant fixed at construction"),
            }
        }
        loop {
            // SAFETY: scoped, not held across a yield.
            let reader_ready = unsafe {
                matches!(self.inner(), Inner::Unbuffered { reader_waiting, .. } if *reader_waiting > 0)
            };
            if reader_ready {
                break;
            }
            sched::with_sched(crate::sched::Scheduler::yield_now);
        }
        // SAFETY: scoped, not held across a yield. Deposit the value; the
        // waiting reader observes `writer_waiting > 0` only after this runs,
        // by construction (see module-level ordering note in `sched.rs`).
        unsafe {
            if let Inner::Unbuffered { slot, .. } = self.inner() {
                slot.write(data);
            }
        }
        loop {
            // SAFETY: scoped, not held across a yield.
            let done = unsafe {
                matches!(self.inner(), Inner::Unbuffered { sync_done, .. } if *sync_done)
            };
            if done {
                break;
            }
            sched::with_sched(crate::sched::Scheduler::yield_now);
        }
        // SAFETY: scoped, not held across a yield.
        unsafe {
            if let Inner::Unbuffered { sync_done, writer_waiting, .. } = self.inner() {
                *sync_done = false;
                let _ = writer_waiting;
            }
        }
        Ok(())
    }

    /// Extract the next element. Blocks while the buffered channel is
    /// empty-but-open, or until a writer rendezvouses on the unbuffered
    /// variant. Returns `Closed` once a closed channel is fully drained.
    pub fn extract(&self) -> Result<T, ChannelStatus> {
        loop {
            // SAFETY: scoped, not held across a yield.
            let action = unsafe {
                match self.inner() {
                    Inner::Buffered { count, closed, .. } if *count == 0 && *closed => {
                        return Err(ChannelStatus::Closed)
                    }
                    Inner::Buffered { count, .. } if *count == 0 => ExtractAction::Retry,
                    Inner::Buffered { buf, head, count, .. } => {
                        let idx = *head;
                        // SAFETY: `idx` was written by a prior `send` and
                        // never re-read once `count` excludes it.
                        let value = unsafe { buf[idx].assume_init_read() };
                        *head = (*head + 1) % CAP;
                        *count -= 1;
                        return Ok(value);
                    }
                    Inner::Unbuffered { .. } => ExtractAction::Unbuffered,
                }
            };
            match action {
                ExtractAction::Retry => {
                    sched::with_sched(crate::sched::Scheduler::yield_now);
                    continue;
                }
                ExtractAction::Unbuffered => return self.extract_unbuffered(),
            }
        }
    }

    fn extract_unbuffered(&self) -> Result<T, ChannelStatus> {
        // SAFETY: scoped, not held across a yield.
        unsafe {
            match self.inner() {
                Inner::Unbuffered { closed, .. } if *closed => return Err(ChannelStatus::Closed),
                Inner::Unbuffered { reader_waiting, .. } => *reader_waiting += 1,
                Inner::Buffered { .. } => unreachable!("variant fixed at construction"),
            }
        }
        // Mandatory pre-check yield: give a writer that's already parked
        // (registered `writer_waiting` before this reader ran) a chance to
        // deposit into `slot` before the check below can ever see it ready.
        // Without this, a reader arriving after the writer would observe
        // `writer_waiting > 0` immediately and read `slot` before the
        // writer's `send_unbuffered` ever reaches its own `slot.write` —
        // an uninitialized read, and the writer then spins forever on
        // `reader_waiting`, which this reader already decremented.
        loop {
            sched::with_sched(crate::sched::Scheduler::yield_now);
            // SAFETY: scoped, not held across a yield.
            let writer_ready = unsafe {
                matches!(self.inner(), Inner::Unbuffered { writer_waiting, .. } if *writer_waiting > 0)
            };
            if writer_ready {
                break;
            }
        }
        // SAFETY: scoped, not held across a yield. By the time
        // `writer_waiting > 0` is visible here, the writer has already
        // deposited into `slot` (see the ordering note in `send_unbuffered`).
        unsafe {
            if let Inner::Unbuffered { reader_waiting, writer_waiting, sync_done, slot, .. } =
                self.inner()
            {
                *reader_waiting -= 1;
                *writer_waiting -= 1;
                *sync_done = true;
                return Ok(slot.assume_init_read());
            }
        }
        unreachable!()
    }

    /// The channel's current transaction status: whether a `send` or
    /// `extract` would proceed immediately, block, or fail outright.
    pub fn status(&self) -> ChannelStatus {
        // SAFETY: read-only, not held across a yield.
        unsafe {
            match self.inner() {
                Inner::Buffered { closed, count, .. } if *closed && *count > 0 => {
                    ChannelStatus::ReadOnly
                }
                Inner::Buffered { closed, .. } if *closed => ChannelStatus::Closed,
                Inner::Buffered { count, .. } if *count == CAP => ChannelStatus::Full,
                Inner::Buffered { count, .. } if *count == 0 => ChannelStatus::Empty,
                Inner::Buffered { .. } => ChannelStatus::Okay,
                Inner::Unbuffered { closed, .. } if *closed => ChannelStatus::Closed,
                Inner::Unbuffered { reader_waiting, .. } if *reader_waiting > 0 => {
                    ChannelStatus::Empty
                }
                Inner::Unbuffered { writer_waiting, .. } if *writer_waiting > 0 => {
                    ChannelStatus::Full
                }
                Inner::Unbuffered { .. } => ChannelStatus::Unbuff,
            }
        }
    }

    pub fn read_ready(&self) -> bool {
        self.read_ready.get()
    }

    pub fn write_ready(&self) -> bool {
        self.write_ready.get()
    }
}

impl<T> Channel<T, 0> {
    /// A one-slot rendezvous channel: a reader and a writer must meet.
    pub fn unbuffered() -> Self {
        Channel {
            inner: core::cell::UnsafeCell::new(Inner::Unbuffered {
                slot: MaybeUninit::uninit(),
                reader_waiting: 0,
                writer_waiting: 0,
                sync_done: false,
                closed: false,
            }),
            read_ready: Cell::new(false),
            write_ready: Cell::new(false),
        }
    }
}

// SAFETY: exactly one task runs at a time under cooperative scheduling, so
// a `Channel` reached through a `'static` or cross-closure reference is
// never actually touched from two execution contexts simultaneously,
// despite the bare `UnsafeCell` inside. This mirrors the reasoning in
// `sched.rs` for `Scheduler`'s own interior mutability.
unsafe impl<T, const CAP: usize> Sync for Channel<T, CAP> {}

impl<T, const CAP: usize> Drop for Channel<T, CAP> {
    fn drop(&mut self) {
        if let Inner::Buffered { buf, head, count, .. } = unsafe { self.inner() } {
            for i in 0..*count {
                let idx = (*head + i) % CAP;
                // SAFETY: exactly the `count` live slots starting at `head`
                // hold initialized values; nothing else reads `buf` after this.
                unsafe { buf[idx].assume_init_drop() };
            }
        }
    }
}

enum SendStep {
    Done(Result<(), ChannelStatus>),
    Retry,
    Unbuffered,
}

enum ExtractAction {
    Retry,
    Unbuffered,
}

/// Object-safe view of a channel for [`chan_select`], independent of its
/// element type — mirrors `struct channel_base *` in `channel.h`, which
/// `chan_select` operates on without knowing `T`.
pub trait ChannelOps {
    fn status(&self) -> ChannelStatus;
    fn set_ready(&self, read_ready: bool, write_ready: bool);
}

impl<T, const CAP: usize> ChannelOps for Channel<T, CAP> {
    fn status(&self) -> ChannelStatus {
        Channel::status(self)
    }

    fn set_ready(&self, read_ready: bool, write_ready: bool) {
        self.read_ready.set(read_ready);
        self.write_ready.set(write_ready);
    }
}

/// Recompute `read_ready`/`write_ready` on every channel in `channels`,
/// without yielding. A pure polling primitive: callers interleave it with
/// their own `coco_yield`, exactly as `example3_signals.c`'s kernel loop
/// does around `extract`.
pub fn chan_select(channels: &[&dyn ChannelOps]) {
    for c in channels {
        let status = c.status();
        let write_ready = matches!(status, ChannelStatus::Okay | ChannelStatus::Empty);
        let read_ready = matches!(
            status,
            ChannelStatus::Okay | ChannelStatus::Full | ChannelStatus::ReadOnly | ChannelStatus::Closed
        );
        c.set_ready(read_ready, write_ready);
    }
}
