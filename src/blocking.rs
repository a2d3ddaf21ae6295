//! The generic "blocked op" bracket shared by the I/O shim and the
//! semaphore shim's sleeping/waking toggle: no semaphore link, just
//! `sleeping`. The semaphore shim layers its own `waiting_semaphore`/
//! `pending_wakeups` handling on top in `semaphore.rs`.

use crate::coordinator::Coordinator;
use crate::evaluator;
use crate::logging::log_block_transition;
use crate::registry::current_thread_id;

pub fn entering_blocked_op(c: &Coordinator, event: &str) {
    let verbose = c.verbose();
    c.with_state(|registry, gate| {
        registry.thread_mut(current_thread_id()).sleeping = true;
        evaluator::maybe_unlock(registry, gate);
        log_block_transition(verbose, event, &registry.block_map());
    });
}

pub fn left_blocked_op(c: &Coordinator, event: &str) {
    let verbose = c.verbose();
    c.with_state(|registry, gate| {
        registry.thread_mut(current_thread_id()).sleeping = false;
        evaluator::maybe_lock(registry, gate);
        log_block_transition(verbose, event, &registry.block_map());
    });
}

/// Bracket `body` (the real blocking call) with entering/left, regardless
/// of how `body` returns.
pub fn bracket<T>(c: &Coordinator, event: &str, body: impl FnOnce() -> T) -> T {
    entering_blocked_op(c, event);
    let result = body();
    left_blocked_op(c, event);
    result
}
