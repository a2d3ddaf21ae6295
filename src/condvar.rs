//! Condition Variable Shim: reimplements cond-init, destroy, wait,
//! timedwait, signal, and broadcast entirely atop the Semaphore Shim.
//! Native condition variables are never consulted — their contract (spurious
//! wakeups, unspecified wakee selection on signal) offers no moment at which
//! an observer could conclude "quiescent", which is the one thing this whole
//! library exists to answer.
//!
//! Every condition variable owns a private IN/OUT semaphore pair, allocated
//! and driven directly against the real libc semaphore calls (never through
//! this crate's own `sem_*` interposition, which would recurse back into a
//! user's condition variable that doesn't exist).

use std::mem::MaybeUninit;

use crate::coordinator::Coordinator;
use crate::error::LibidleError;
use crate::registry::{ConditionId, ConditionRecord, SemaphoreId, SemaphoreRecord};
use crate::semaphore;

/// Allocate and `sem_init` a fresh anonymous semaphore, registering it in
/// the registry under its own heap address. Must be called with the
/// coordinator lock held (the registry borrow enforces this).
fn alloc_generation(c: &Coordinator, registry: &mut crate::registry::Registry) -> (SemaphoreId, SemaphoreId) {
    let sem_in = new_real_semaphore(c);
    let sem_out = new_real_semaphore(c);
    registry.insert_semaphore(sem_in, SemaphoreRecord::anonymous(0));
    registry.insert_semaphore(sem_out, SemaphoreRecord::anonymous(0));
    (sem_in, sem_out)
}

fn new_real_semaphore(c: &Coordinator) -> SemaphoreId {
    let boxed = Box::new(MaybeUninit::<libc::sem_t>::zeroed());
    let ptr = Box::into_raw(boxed) as *mut libc::sem_t;
    let rc = unsafe { (c.symbols.sem_init)(ptr, 0, 0) };
    debug_assert_eq!(rc, 0, "sem_init on an internally-owned semaphore must not fail");
    ptr as SemaphoreId
}

fn destroy_real_semaphore(c: &Coordinator, id: SemaphoreId) {
    let ptr = id as *mut libc::sem_t;
    unsafe {
        (c.symbols.sem_destroy)(ptr);
        drop(Box::from_raw(ptr as *mut MaybeUninit<libc::sem_t>));
    }
}

/// Register a freshly-observed `pthread_cond_init` at `id` (the address of
/// the caller's `pthread_cond_t`).
pub fn on_init(c: &Coordinator, id: ConditionId) {
    c.with_state(|registry, _gate| {
        let (sem_in, sem_out) = alloc_generation(c, registry);
        registry.insert_condition(
            id,
            ConditionRecord {
                sem_in,
                sem_out,
                sleeping_threads: 0,
            },
        );
    });
}

/// Tear down a condition variable. Contract violation (destroying with
/// active waiters) is reported rather than silently ignored, so the FFI
/// layer can turn it into an abort.
pub fn on_destroy(c: &Coordinator, id: ConditionId) -> Result<(), LibidleError> {
    let (sem_in, sem_out) = c.with_state(|registry, _gate| -> Result<(SemaphoreId, SemaphoreId), LibidleError> {
        let rec = registry
            .condition(id)
            .ok_or(LibidleError::RegistryLookup("condition"))?;
        if rec.sleeping_threads != 0 {
            return Err(LibidleError::DestroyWithWaiters(rec.sleeping_threads));
        }
        let (sem_in, sem_out) = (rec.sem_in, rec.sem_out);
        registry.remove_condition(id);
        registry.remove_semaphore(sem_in);
        registry.remove_semaphore(sem_out);
        Ok((sem_in, sem_out))
    })?;
    destroy_real_semaphore(c, sem_in);
    destroy_real_semaphore(c, sem_out);
    Ok(())
}

/// Shared core of `wait`/`timedwait`. `timeout` selects `sem_timedwait`
/// over `sem_wait` on the captured IN. Returns whether the wait timed out
/// (always `false` for the untimed path).
///
/// The external mutex is released under the coordinator lock (step 1 of
/// the protocol) so no broadcast targeting this waiter can be lost between
/// releasing the mutex and registering as a waiter, and reacquired only
/// after the wait has fully resolved (including posting OUT), matching
/// the condition-wait contract.
fn wait_inner(
    c: &Coordinator,
    id: ConditionId,
    unlock_user_mutex: impl FnOnce(),
    lock_user_mutex: impl FnOnce(),
    timeout: Option<*const libc::timespec>,
) -> Result<bool, LibidleError> {
    let (sem_in, sem_out) = c.with_state(|registry, _gate| -> Result<(SemaphoreId, SemaphoreId), LibidleError> {
        unlock_user_mutex();
        let rec = registry
            .condition_mut(id)
            .ok_or(LibidleError::RegistryLookup("condition"))?;
        rec.sleeping_threads += 1;
        Ok((rec.sem_in, rec.sem_out))
    })?;

    let timed_out = semaphore::run_wait(c, sem_in, || {
        let ptr = sem_in as *mut libc::sem_t;
        match timeout {
            Some(ts) => {
                let rc = unsafe { (c.symbols.sem_timedwait)(ptr, ts) };
                (rc != 0, rc == 0)
            }
            None => {
                let rc = unsafe { (c.symbols.sem_wait)(ptr) };
                (false, rc == 0)
            }
        }
    });

    // OUT is posted whether or not the wait succeeded, so the broadcaster's
    // n-wait on the detached OUT always balances.
    semaphore::record_post(c, sem_out);
    unsafe {
        (c.symbols.sem_post)(sem_out as *mut libc::sem_t);
    }

    lock_user_mutex();
    Ok(timed_out)
}

pub fn wait(
    c: &Coordinator,
    id: ConditionId,
    unlock_user_mutex: impl FnOnce(),
    lock_user_mutex: impl FnOnce(),
) -> Result<(), LibidleError> {
    wait_inner(c, id, unlock_user_mutex, lock_user_mutex, None).map(|_| ())
}

/// Returns `Ok(true)` if the wait timed out, `Ok(false)` if the condition
/// was signaled/broadcast to.
pub fn timedwait(
    c: &Coordinator,
    id: ConditionId,
    unlock_user_mutex: impl FnOnce(),
    lock_user_mutex: impl FnOnce(),
    timeout: *const libc::timespec,
) -> Result<bool, LibidleError> {
    wait_inner(c, id, unlock_user_mutex, lock_user_mutex, Some(timeout))
}

/// Broadcast (and signal, which is promoted to broadcast — the
/// condition-variable contract already permits waking more than one waiter
/// on a signal).
pub fn broadcast(c: &Coordinator, id: ConditionId) -> Result<(), LibidleError> {
    let (n, old_in, old_out) = c.with_state(|registry, _gate| -> Result<(u32, SemaphoreId, SemaphoreId), LibidleError> {
        let rec = registry
            .condition_mut(id)
            .ok_or(LibidleError::RegistryLookup("condition"))?;
        let n = rec.sleeping_threads;
        let (old_in, old_out) = (rec.sem_in, rec.sem_out);
        let (new_in, new_out) = alloc_generation(c, registry);
        let rec = registry.condition_mut(id).expect("just looked up above");
        rec.sem_in = new_in;
        rec.sem_out = new_out;
        rec.sleeping_threads = 0;
        Ok((n, old_in, old_out))
    })?;

    for _ in 0..n {
        semaphore::record_post(c, old_in);
        unsafe {
            (c.symbols.sem_post)(old_in as *mut libc::sem_t);
        }
    }
    for _ in 0..n {
        semaphore::run_wait(c, old_out, || {
            let rc = unsafe { (c.symbols.sem_wait)(old_out as *mut libc::sem_t) };
            (rc, rc == 0)
        });
    }

    destroy_real_semaphore(c, old_in);
    destroy_real_semaphore(c, old_out);
    c.with_state(|registry, _gate| {
        registry.remove_semaphore(old_in);
        registry.remove_semaphore(old_out);
    });
    Ok(())
}
