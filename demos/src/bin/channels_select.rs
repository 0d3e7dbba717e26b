//! Two producers send 0..10 into independent buffered channels (capacity
//! 10) at different `yieldForMs` delays; the kernel polls both with
//! `chan_select` and prints values as they arrive — grounded in
//! `original_source/examples/example1_channels.c`.
#![allow(clippy::expect_used)]

use coco::{chan_select, coco_exit, yield_for_ms, Channel, ChannelOps};

struct NatsArgs {
    chan: Channel<i32, 10>,
    delay_ms: u32,
}

extern "C" fn nats(args: *mut u8) {
    // SAFETY: `args` points at a `NatsArgs` owned by `kernel`'s stack
    // frame, which outlives this task (`kernel` waitpids both producers
    // before it returns).
    let args = unsafe { &*(args as *const NatsArgs) };
    for n in 0..10 {
        args.chan.send(n).expect("channel not closed mid-demo");
        yield_for_ms(args.delay_ms);
    }
    args.chan.close();
    coco_exit(0);
}

extern "C" fn kernel(_: *mut u8) {
    let arg1 = NatsArgs { chan: Channel::buffered(), delay_ms: 300 };
    let arg2 = NatsArgs { chan: Channel::buffered(), delay_ms: 500 };

    let t1 = coco::add_task(nats, &arg1 as *const NatsArgs as *mut u8);
    let t2 = coco::add_task(nats, &arg2 as *const NatsArgs as *mut u8);
    println!("spawned tids ({}, {})", t1.0, t2.0);

    while !(arg1.chan.closed() && arg2.chan.closed()) {
        let channels: [&dyn ChannelOps; 2] = [&arg1.chan, &arg2.chan];
        chan_select(&channels);
        if arg1.chan.read_ready() && !arg1.chan.closed() {
            if let Ok(val) = arg1.chan.extract() {
                println!("1: {val}");
            }
        }
        if arg2.chan.read_ready() && !arg2.chan.closed() {
            if let Ok(val) = arg2.chan.extract() {
                println!("2: {val}");
            }
        }
        coco::coco_yield();
    }

    coco::coco_waitpid(t1, None, 0);
    coco::coco_waitpid(t2, None, 0);
    coco_exit(0);
}

fn main() {
    env_logger::init();
    let status = coco::coco_start(kernel, core::ptr::null_mut());
    std::process::exit(status);
}
