//! End-to-end scenarios and property tests driving the core state machine
//! directly through its `Coordinator`/`Registry`/`Gate` API, the way the
//! unit tests in each module do, but composing multiple shims together the
//! way a real instrumented program would. These do not go through the
//! `#[no_mangle]` C surface in `src/lib.rs` — that surface is a thin,
//! untestable-without-a-real-process wrapper around exactly this core.

use std::io::Read;
use std::sync::Arc;
use std::thread;

use libidle::coordinator::{test_coordinator, Coordinator};
use libidle::registry::{current_thread_id, SemaphoreRecord};
use libidle::{blocking, condvar, forced_idle, semaphore};

fn read_state_file(path: &std::path::Path) -> String {
    let mut s = String::new();
    std::fs::File::open(path).unwrap().read_to_string(&mut s).unwrap();
    s
}

/// Scenario 1: a single thread repeatedly blocked in a bracketed op (the
/// stand-in for `accept` on a socket that never connects) goes idle
/// exactly once, and the lock stays released for the whole blocked span.
#[test]
fn single_thread_accept_loop_goes_idle_once() {
    let (c, f) = test_coordinator();
    c.with_state(|registry, gate| {
        registry.register_thread(current_thread_id());
        libidle::evaluator::maybe_lock(registry, gate);
    });

    blocking::entering_blocked_op(&c, "accept");
    assert!(!c.with_state(|_registry, gate| gate.locked()));
    assert_eq!(read_state_file(f.path()), "1\n");
}

/// Scenario 2: thread A waits on an initially-empty semaphore, thread B
/// posts once. The process is idle (times_idle = 1) until the post, then
/// busy, then idle again once A has consumed the token and gone back to
/// waiting (times_idle = 2).
#[test]
fn producer_consumer_over_anonymous_semaphore() {
    let (c, f) = test_coordinator();
    c.with_state(|registry, gate| {
        registry.register_thread(current_thread_id());
        libidle::evaluator::maybe_lock(registry, gate);
    });

    let sem_id = 0x5e0a;
    semaphore::on_create_anonymous(&c, sem_id, 0);

    let c = Arc::new(c);
    let waiter = {
        let c = Arc::clone(&c);
        thread::spawn(move || {
            c.with_state(|registry, _gate| registry.register_thread(current_thread_id()));
            // Two iterations: initial wait-for-post, then re-wait.
            for _ in 0..2 {
                semaphore::run_wait(&c, sem_id, || {
                    // Busy-poll the in-process "semaphore" via pending_wakeups
                    // instead of a real libc::sem_t, since this test exercises
                    // only the accounting, not the real kernel primitive.
                    loop {
                        let has_token = c.with_state(|registry, _gate| {
                            registry.semaphore(sem_id).map(|s| s.pending_wakeups > 0).unwrap_or(false)
                        });
                        if has_token {
                            break;
                        }
                        thread::yield_now();
                    }
                    ((), true)
                });
            }
        })
    };

    // Wait until the waiter and main thread are both blocked: times_idle == 1.
    loop {
        if read_state_file(f.path()) == "1\n" {
            break;
        }
        thread::yield_now();
    }

    semaphore::record_post(&c, sem_id);

    // Wait for the second idle transition.
    loop {
        let contents = read_state_file(f.path());
        if contents == "2\n" {
            break;
        }
        thread::yield_now();
    }

    waiter.join().unwrap();
}

/// Scenario 3: three waiters on a condition variable; a fourth thread
/// broadcasts. All three resume, `sleeping_threads` returns to zero, and a
/// subsequent broadcast with no waiters is a no-op.
#[test]
fn condition_broadcast_releases_all_waiters() {
    let (c, _f) = test_coordinator();
    c.with_state(|registry, _gate| registry.register_thread(current_thread_id()));
    let cond_id = 0xc0fee;
    condvar::on_init(&c, cond_id);

    let c = Arc::new(c);
    let mut handles = Vec::new();
    for _ in 0..3 {
        let c = Arc::clone(&c);
        handles.push(thread::spawn(move || {
            c.with_state(|registry, _gate| registry.register_thread(current_thread_id()));
            condvar::wait(&c, cond_id, || {}, || {}).unwrap();
        }));
    }

    loop {
        let sleeping = c.with_state(|registry, _gate| registry.condition(cond_id).unwrap().sleeping_threads);
        if sleeping == 3 {
            break;
        }
        thread::yield_now();
    }

    condvar::broadcast(&c, cond_id).unwrap();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(
        c.with_state(|registry, _gate| registry.condition(cond_id).unwrap().sleeping_threads),
        0
    );

    // A second broadcast with nobody sleeping must still succeed (n = 0).
    condvar::broadcast(&c, cond_id).unwrap();
}

/// Scenario 4: broadcast generation isolation. Two waiters A, B; broadcast;
/// a new waiter C enters; broadcast again. C must only be released by the
/// second broadcast, never the first.
#[test]
fn broadcast_generation_isolation() {
    let (c, _f) = test_coordinator();
    let cond_id = 0xbead;
    condvar::on_init(&c, cond_id);
    let c = Arc::new(c);

    let spawn_waiter = |c: &Arc<Coordinator>, cond_id: libidle::registry::ConditionId| {
        let c = Arc::clone(c);
        thread::spawn(move || {
            c.with_state(|registry, _gate| registry.register_thread(current_thread_id()));
            condvar::wait(&c, cond_id, || {}, || {}).unwrap();
        })
    };

    let a = spawn_waiter(&c, cond_id);
    let b = spawn_waiter(&c, cond_id);
    loop {
        if c.with_state(|registry, _gate| registry.condition(cond_id).unwrap().sleeping_threads) == 2 {
            break;
        }
        thread::yield_now();
    }

    condvar::broadcast(&c, cond_id).unwrap();
    a.join().unwrap();
    b.join().unwrap();

    let c_thread = spawn_waiter(&c, cond_id);
    loop {
        if c.with_state(|registry, _gate| registry.condition(cond_id).unwrap().sleeping_threads) == 1 {
            break;
        }
        thread::yield_now();
    }
    // C must still be sleeping: the first broadcast's tokens cannot reach it.
    assert_eq!(
        c.with_state(|registry, _gate| registry.condition(cond_id).unwrap().sleeping_threads),
        1
    );

    condvar::broadcast(&c, cond_id).unwrap();
    c_thread.join().unwrap();
}

/// Scenario 5: forced-idle over a message dispatch never produces a
/// spurious busy transition between "work started" and "work finished" —
/// the gate only toggles at the bracket boundaries.
#[test]
fn forced_idle_brackets_dispatch_without_spurious_busy() {
    let (c, f) = test_coordinator();
    c.with_state(|registry, gate| {
        registry.register_thread(current_thread_id());
        libidle::evaluator::maybe_lock(registry, gate);
    });

    forced_idle::enable_forced_idle_on(&c);
    assert_eq!(read_state_file(f.path()), "1\n");
    assert!(!c.with_state(|_r, gate| gate.locked()));

    // "work" that does not itself block must not flip the gate.
    let _ = 2 + 2;
    assert_eq!(read_state_file(f.path()), "1\n");

    forced_idle::disable_forced_idle_on(&c);
    assert!(c.with_state(|_r, gate| gate.locked()));
}

/// Scenario 6: a wait on a named semaphore never contributes to
/// `active_threads` — if it were the only "blocked" thread, the gate would
/// remain locked.
#[test]
fn named_semaphore_wait_does_not_count_as_blocked() {
    let (c, _f) = test_coordinator();
    c.with_state(|registry, _gate| registry.register_thread(current_thread_id()));
    let named_id = 0x4a3e;
    semaphore::on_create_named(&c, named_id);

    semaphore::run_wait(&c, named_id, || ((), true));

    // The thread never marked itself sleeping for a named-semaphore wait,
    // so it remains counted as active throughout.
    assert_eq!(c.with_state(|registry, _gate| registry.active_threads()), 1);
}

/// Testable property 3: no idle transition happens while a thread's
/// waiting_semaphore still has a pending wakeup.
#[test]
fn no_idle_while_pending_wakeup_targets_a_waiter() {
    let (c, f) = test_coordinator();
    c.with_state(|registry, gate| {
        registry.register_thread(current_thread_id());
        registry.insert_semaphore(0xfeed, SemaphoreRecord::anonymous(1));
        let t = registry.thread_mut(current_thread_id());
        t.sleeping = true;
        t.waiting_semaphore = Some(0xfeed);
        libidle::evaluator::maybe_unlock(registry, gate);
    });
    assert!(c.with_state(|_r, gate| gate.locked()));
    assert_eq!(read_state_file(f.path()), "");
}

/// Round-trip: enable_forced_idle then disable_forced_idle with nothing in
/// between never advances times_idle, because the thread re-activates
/// before any evaluator call could observe full idleness elsewhere.
#[test]
fn forced_idle_round_trip_alone_is_a_noop_on_times_idle() {
    let (c, _f) = test_coordinator();
    c.with_state(|registry, gate| {
        registry.register_thread(current_thread_id());
        libidle::evaluator::maybe_lock(registry, gate);
    });
    let other: libc::pthread_t = unsafe { std::mem::transmute(0x9999u64 as usize) };
    c.with_state(|registry, _gate| registry.register_thread(other));

    let before = c.with_state(|_r, gate| gate.times_idle());
    forced_idle::enable_forced_idle_on(&c);
    forced_idle::disable_forced_idle_on(&c);
    let after = c.with_state(|_r, gate| gate.times_idle());
    assert_eq!(before, after);
}

/// Round-trip: init immediately followed by destroy of a condition
/// variable leaves the registry unaffected.
#[test]
fn condition_init_then_destroy_leaves_no_trace() {
    let (c, _f) = test_coordinator();
    condvar::on_init(&c, 0xacdc);
    condvar::on_destroy(&c, 0xacdc).unwrap();
    assert!(c.with_state(|registry, _gate| registry.condition(0xacdc).is_none()));
}
