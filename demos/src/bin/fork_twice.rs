//! Fork demo: a task prints once, forks, and both copies print twice —
//! grounded in `original_source/examples/example9_fork.c`.

use coco::{coco_exit, coco_fork, coco_waitpid};

extern "C" fn f(_: *mut u8) {
    println!("once");
    let tid = coco_fork();
    println!("twice");
    if tid.is_none() {
        println!("child");
    } else {
        println!("parent, child's tid is {}", tid.0);
        coco_waitpid(tid, None, 0);
    }
    coco_exit(0);
}

extern "C" fn kernel(_: *mut u8) {
    let tid = coco::add_task(f, core::ptr::null_mut());
    coco_waitpid(tid, None, 0);
    coco_exit(0);
}

fn main() {
    env_logger::init();
    let status = coco::coco_start(kernel, core::ptr::null_mut());
    std::process::exit(status);
}
