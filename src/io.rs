//! Blocking I/O Shim plus thread lifecycle observation.
//!
//! `accept` and `recv` are bracketed with the generic blocked-op toggle —
//! no semaphore link, so invariant 1 makes the calling thread unambiguously
//! blocked for the call's duration. `pthread_join` gets the same bracket,
//! plus marks the joined thread's record `terminated` on a successful join,
//! excluding it from `active_threads` without ever removing its history.
//!
//! `pthread_create` is observed so a freshly spawned thread registers
//! itself the moment it starts running, via a trampoline that wraps the
//! caller's start routine.

use std::os::raw::c_void;

use crate::blocking;
use crate::coordinator::{coordinator, Coordinator};
use crate::evaluator;
use crate::registry::current_thread_id;

pub fn accept(c: &Coordinator, body: impl FnOnce() -> i32) -> i32 {
    blocking::bracket(c, "accept", body)
}

pub fn recv(c: &Coordinator, body: impl FnOnce() -> isize) -> isize {
    blocking::bracket(c, "recv", body)
}

/// `pthread_join`'s bracket additionally reaps the joined thread on
/// success: a thread that has been joined can never run again, so its
/// record is marked `terminated` rather than merely `sleeping`, and it is
/// excluded from `active_threads` unconditionally from then on.
pub fn join(c: &Coordinator, joined_thread: libc::pthread_t, body: impl FnOnce() -> i32) -> i32 {
    let rc = blocking::bracket(c, "pthread_join", body);
    if rc == 0 {
        let verbose = c.verbose();
        c.with_state(|registry, gate| {
            registry.thread_mut(joined_thread).terminated = true;
            evaluator::maybe_unlock(registry, gate);
            crate::logging::log_block_transition(verbose, "pthread_join_reap", &registry.block_map());
        });
    }
    rc
}

struct TrampolineArgs {
    real_start: extern "C" fn(*mut c_void) -> *mut c_void,
    real_arg: *mut c_void,
}

/// Runs on the newly spawned thread, before the caller's own start routine.
/// Registers the thread (and performs the corresponding busy re-evaluation,
/// since a freshly spawned thread is active by construction) and then
/// hands control to the real start routine.
extern "C" fn trampoline(arg: *mut c_void) -> *mut c_void {
    let boxed = unsafe { Box::from_raw(arg as *mut TrampolineArgs) };
    let TrampolineArgs { real_start, real_arg } = *boxed;

    let c = coordinator();
    c.with_state(|registry, gate| {
        registry.register_thread(current_thread_id());
        evaluator::maybe_lock(registry, gate);
    });

    real_start(real_arg)
}

/// Interpose `pthread_create`: wrap the caller's start routine in
/// `trampoline` so the new thread self-registers as soon as it runs,
/// rather than racing the parent's read of the `pthread_t` out-parameter.
pub fn create(
    thread_out: *mut libc::pthread_t,
    attr: *const libc::pthread_attr_t,
    start_routine: extern "C" fn(*mut c_void) -> *mut c_void,
    arg: *mut c_void,
) -> i32 {
    let c = coordinator();
    let boxed = Box::new(TrampolineArgs {
        real_start: start_routine,
        real_arg: arg,
    });
    let trampoline_arg = Box::into_raw(boxed) as *mut c_void;
    unsafe { (c.symbols.pthread_create)(thread_out, attr, trampoline, trampoline_arg) }
}
