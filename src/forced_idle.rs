//! Public API for pinning a thread as idle across a user-defined region,
//! decoupled from any specific blocking primitive. Typical
//! use: a worker thread that reads a full message, calls
//! `enable_forced_idle`, dispatches (work that does not itself block), then
//! calls `disable_forced_idle` — preventing a spurious busy signal between
//! "read returned" and "work done".

use crate::coordinator::{coordinator, Coordinator};
use crate::evaluator;
use crate::logging::log_block_transition;
use crate::registry::current_thread_id;

pub fn enable_forced_idle_on(c: &Coordinator) {
    let verbose = c.verbose();
    c.with_state(|registry, gate| {
        registry.thread_mut(current_thread_id()).forced_idle = true;
        evaluator::maybe_unlock(registry, gate);
        log_block_transition(verbose, "enable_forced_idle", &registry.block_map());
    });
}

pub fn disable_forced_idle_on(c: &Coordinator) {
    let verbose = c.verbose();
    c.with_state(|registry, gate| {
        registry.thread_mut(current_thread_id()).forced_idle = false;
        evaluator::maybe_lock(registry, gate);
        log_block_transition(verbose, "disable_forced_idle", &registry.block_map());
    });
}

pub fn enable_forced_idle() {
    enable_forced_idle_on(coordinator());
}

pub fn disable_forced_idle() {
    disable_forced_idle_on(coordinator());
}

/// `#[no_mangle]` surface for the instrumented C program.
#[no_mangle]
pub extern "C" fn libidle_enable_forced_idle() {
    enable_forced_idle();
}

#[no_mangle]
pub extern "C" fn libidle_disable_forced_idle() {
    disable_forced_idle();
}
