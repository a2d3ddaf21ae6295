//! Semaphore Shim: create/destroy/post/wait/timedwait, maintaining
//! per-semaphore pending-wakeup counts and integrating with the evaluator.
//! Anonymous semaphores participate fully in idle accounting; named
//! semaphores (opened via `sem_open`) are excluded entirely, since they
//! may be posted by another process.

use crate::coordinator::Coordinator;
use crate::evaluator;
use crate::logging::log_block_transition;
use crate::registry::{current_thread_id, SemaphoreRecord};

pub type SemaphoreId = usize;

pub fn id_of(sem: *mut libc::sem_t) -> SemaphoreId {
    sem as usize
}

/// Record a freshly (successfully) initialized anonymous semaphore.
pub fn on_create_anonymous(c: &Coordinator, id: SemaphoreId, initial_value: u32) {
    c.with_state(|registry, _gate| {
        registry.insert_semaphore(id, SemaphoreRecord::anonymous(initial_value));
    });
}

/// Record a freshly (successfully) opened named semaphore.
pub fn on_create_named(c: &Coordinator, id: SemaphoreId) {
    c.with_state(|registry, _gate| {
        registry.insert_semaphore(id, SemaphoreRecord::named());
    });
}

/// Drop the bookkeeping for a semaphore about to be destroyed. Callers
/// must not destroy a semaphore with waiters — this is a host-program
/// contract, not something this shim enforces at runtime.
pub fn on_destroy(c: &Coordinator, id: SemaphoreId) {
    c.with_state(|registry, _gate| {
        registry.remove_semaphore(id);
    });
}

/// Post a token. The pending-wakeup increment must happen before the real
/// underlying post is issued by the caller, so no waiter can observe a
/// post-with-zero-pending window.
pub fn record_post(c: &Coordinator, id: SemaphoreId) {
    c.with_state(|registry, _gate| {
        if let Some(rec) = registry.semaphore_mut(id) {
            if !rec.named {
                rec.pending_wakeups += 1;
            }
        }
    });
}

/// Whether `id` refers to a named semaphore, or is unknown to the
/// registry (treated the same as named: outside idle accounting).
fn bypasses_idle_tracking(c: &Coordinator, id: SemaphoreId) -> bool {
    c.with_state(|registry, _gate| registry.semaphore(id).map(|r| r.named).unwrap_or(true))
}

/// Run `wait_call` (the real `sem_wait`/`sem_timedwait`) with the full
/// anonymous-semaphore bracket, or as a bare pass-through for a named
/// semaphore — named-semaphore waits never mark the thread as sleeping,
/// so they never influence `active_threads`.
///
/// `wait_call` returns `(return_value, consumed_token)`; the caller tells
/// us whether the wait actually consumed a token (it didn't, on a
/// `timedwait` that expired) — `pending_wakeups` is only decremented on a
/// genuine acquire, never on a timeout.
pub fn run_wait<T>(c: &Coordinator, id: SemaphoreId, wait_call: impl FnOnce() -> (T, bool)) -> T {
    if bypasses_idle_tracking(c, id) {
        return wait_call().0;
    }

    let verbose = c.verbose();

    // Step 1: publish which semaphore we're about to wait on.
    c.with_state(|registry, _gate| {
        registry.thread_mut(current_thread_id()).waiting_semaphore = Some(id);
    });

    // Step 2: entering-blocked-op.
    c.with_state(|registry, gate| {
        registry.thread_mut(current_thread_id()).sleeping = true;
        evaluator::maybe_unlock(registry, gate);
        log_block_transition(verbose, "sem_wait", &registry.block_map());
    });

    // Step 3: the real wait, coordinator lock released throughout.
    let (result, consumed_token) = wait_call();

    // Step 4: left-blocked-op. Sleeping clears first, then the
    // waiting-semaphore link, then the pending-wakeup decrement, then the
    // lock re-evaluation, all within one critical section, so no external
    // observer can see a partial state.
    c.with_state(|registry, gate| {
        let t = registry.thread_mut(current_thread_id());
        t.sleeping = false;
        t.waiting_semaphore = None;
        if consumed_token {
            if let Some(rec) = registry.semaphore_mut(id) {
                rec.pending_wakeups = rec.pending_wakeups.saturating_sub(1);
            }
        }
        evaluator::maybe_lock(registry, gate);
        log_block_transition(verbose, "sem_wait_return", &registry.block_map());
    });

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::test_coordinator;

    #[test]
    fn post_increments_pending_wakeups_for_anonymous() {
        let (c, _f) = test_coordinator();
        let id = 0xdead_beef;
        on_create_anonymous(&c, id, 0);
        record_post(&c, id);
        c.with_state(|registry, _gate| {
            assert_eq!(registry.semaphore(id).unwrap().pending_wakeups, 1);
        });
    }

    #[test]
    fn post_is_noop_for_named_semaphore_pending_count() {
        let (c, _f) = test_coordinator();
        let id = 0xfeed_face;
        on_create_named(&c, id);
        record_post(&c, id);
        c.with_state(|registry, _gate| {
            assert_eq!(registry.semaphore(id).unwrap().pending_wakeups, 0);
        });
    }

    #[test]
    fn wait_on_unknown_semaphore_bypasses_tracking() {
        let (c, _f) = test_coordinator();
        let called = std::cell::Cell::new(false);
        let ret = run_wait(&c, 0x1234, || {
            called.set(true);
            (42, true)
        });
        assert_eq!(ret, 42);
        assert!(called.get());
    }

    #[test]
    fn wait_on_named_semaphore_never_marks_sleeping() {
        let (c, _f) = test_coordinator();
        let id = 0xaaaa;
        on_create_named(&c, id);
        c.with_state(|registry, _gate| registry.register_thread(current_thread_id()));

        run_wait(&c, id, || ((), true));

        c.with_state(|registry, _gate| {
            assert!(!registry.thread(current_thread_id()).unwrap().sleeping);
            assert!(registry.thread(current_thread_id()).unwrap().waiting_semaphore.is_none());
        });
    }

    #[test]
    fn timedwait_expiry_does_not_decrement_pending_wakeups() {
        let (c, _f) = test_coordinator();
        let id = 0xbbbb;
        on_create_anonymous(&c, id, 1);
        run_wait(&c, id, || (libc::ETIMEDOUT, false));
        c.with_state(|registry, _gate| {
            assert_eq!(registry.semaphore(id).unwrap().pending_wakeups, 1);
        });
    }

    #[test]
    fn successful_wait_decrements_pending_wakeups() {
        let (c, _f) = test_coordinator();
        let id = 0xcccc;
        on_create_anonymous(&c, id, 1);
        run_wait(&c, id, || (0, true));
        c.with_state(|registry, _gate| {
            assert_eq!(registry.semaphore(id).unwrap().pending_wakeups, 0);
        });
    }
}
