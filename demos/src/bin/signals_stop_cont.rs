//! Signal stop/continue: task A raises `SIGSTP` on task B once B has sent
//! its fifth value; when the faster producer C finishes, A raises
//! `SIGCONT` on B, which resumes and finishes its remaining sends —
//! grounded in `original_source/examples/example3_signals.c`.
#![allow(clippy::expect_used)]

use coco::{
    chan_select, coco_exit, coco_kill, coco_sigaction, yield_for_ms, Channel, ChannelOps, Signal,
    WaitGroup,
};

struct NatsArgs {
    chan: Channel<i32, 10>,
    wg: &'static WaitGroup,
    delay_ms: u32,
}

fn sigstp_handler() {
    println!("stopped");
}

fn sigcont_handler() {
    println!("continued");
}

extern "C" fn nats(args: *mut u8) {
    // SAFETY: `args` points at a `NatsArgs` owned by `kernel`'s stack
    // frame, which outlives every spawned task (`kernel` waits on `WG`
    // before returning).
    let args = unsafe { &*(args as *const NatsArgs) };
    coco_sigaction(Signal::SigStp, sigstp_handler).expect("SigStp is a valid signal");
    coco_sigaction(Signal::SigCont, sigcont_handler).expect("SigCont is a valid signal");
    for n in 0..10 {
        args.chan.send(n).expect("channel not closed mid-demo");
        yield_for_ms(args.delay_ms);
    }
    args.chan.close();
    args.wg.done();
    coco_exit(0);
}

extern "C" fn kernel(_: *mut u8) {
    static WG: WaitGroup = WaitGroup::new();
    let arg1 = NatsArgs { chan: Channel::buffered(), wg: &WG, delay_ms: 50 };
    let arg2 = NatsArgs { chan: Channel::buffered(), wg: &WG, delay_ms: 80 };
    WG.add(2);

    let t1 = coco::add_task(nats, &arg1 as *const NatsArgs as *mut u8);
    let t2 = coco::add_task(nats, &arg2 as *const NatsArgs as *mut u8);
    println!("spawned tids ({}, {})", t1.0, t2.0);

    // Poll both channels with `chan_select` rather than blocking `extract`
    // directly: once `t1` is stopped it stops producing, and a blocking
    // extract from `arg1.chan` would park the kernel task right where it
    // could never reach the `SIGCONT` below.
    let mut stopped_t1 = false;
    let mut resumed_t1 = false;
    while !WG.check() {
        coco::coco_yield();
        let channels: [&dyn ChannelOps; 2] = [&arg1.chan, &arg2.chan];
        chan_select(&channels);
        if arg1.chan.read_ready() && !arg1.chan.closed() {
            if let Ok(val) = arg1.chan.extract() {
                println!("1: {val}");
                if val == 5 && !stopped_t1 {
                    coco_kill(t1, Signal::SigStp);
                    stopped_t1 = true;
                }
            }
        }
        if arg2.chan.read_ready() && !arg2.chan.closed() {
            if let Ok(val) = arg2.chan.extract() {
                println!("2: {val}");
            }
        }
        if stopped_t1 && !resumed_t1 && coco::coco_waitpid(t2, None, coco::WNOHANG) == t2 {
            coco_kill(t1, Signal::SigCont);
            resumed_t1 = true;
        }
    }
    coco::coco_waitpid(t1, None, 0);
    coco_exit(0);
}

fn main() {
    env_logger::init();
    let status = coco::coco_start(kernel, core::ptr::null_mut());
    std::process::exit(status);
}
