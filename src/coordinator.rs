//! The Coordinator: a single process-wide recursive mutex serializing every
//! registry read/write and every call into the evaluator, plus the
//! process-global singleton that owns the Registry, the Gate, and the
//! resolved real symbols.
//!
//! Recursion is required because the condition-variable shim calls back
//! into the semaphore shim (which itself takes the coordinator lock) while
//! some condition-variable paths hold it across their own setup/teardown.
//! `parking_lot::ReentrantMutex` gives us that directly, rather than
//! hand-rolling an owner-thread-id recursion counter the way a
//! non-reentrant `Mutex` would require.

use std::cell::RefCell;

use anyhow::Context;
use once_cell::sync::OnceCell;
use parking_lot::ReentrantMutex;

use crate::config::Config;
use crate::evaluator;
use crate::gate::Gate;
use crate::registry::{current_thread_id, Registry};
use crate::symbols::RealSymbols;

struct State {
    registry: Registry,
    gate: Gate,
}

pub struct Coordinator {
    state: ReentrantMutex<RefCell<State>>,
    pub symbols: RealSymbols,
    pub config: Config,
}

static COORDINATOR: OnceCell<Coordinator> = OnceCell::new();

/// Borrow the process-global coordinator.
///
/// # Panics
/// Panics if called before `init()` has run. Every interposed entry point
/// runs after the ctor, so in practice this never fires outside of test
/// code that reached for the global instead of `test_coordinator()`.
pub fn coordinator() -> &'static Coordinator {
    COORDINATOR
        .get()
        .expect("libidle coordinator used before initialization")
}

/// Process-global initializer: resolves real symbols, opens the state
/// file, registers the initial thread, and performs the initial busy
/// transition — the process starts busy.
///
/// A ctor has no caller to propagate a `Result` to, so `try_init` does the
/// actual fallible work and this wrapper turns any error into the fatal
/// startup abort spec.md §7 prescribes for symbol-resolution/state-file
/// failures, printing the full `anyhow` error chain first.
pub fn init() {
    if let Err(e) = try_init() {
        eprintln!("libidle: fatal error during startup: {e:#}");
        std::process::abort();
    }
}

fn try_init() -> anyhow::Result<()> {
    let config = Config::from_env();
    crate::logging::init(config.verbose);

    let gate = Gate::open(&config.state_file)
        .with_context(|| format!("opening state file `{}`", config.state_file))?;
    let mut registry = Registry::new();
    registry.register_thread(current_thread_id());

    let coordinator = Coordinator {
        state: ReentrantMutex::new(RefCell::new(State { registry, gate })),
        symbols: RealSymbols::resolve(),
        config,
    };

    if COORDINATOR.set(coordinator).is_err() {
        return Ok(());
    }
    // Initial busy transition: the process starts busy.
    coordinator().with_state(|registry, gate| {
        evaluator::maybe_lock(registry, gate);
    });
    Ok(())
}

impl Coordinator {
    /// Run `f` with exclusive (but reentrant-from-this-thread) access to
    /// the Registry and Gate. This is the only way either is touched.
    ///
    /// `ReentrantMutexGuard::lock()` lets the same thread re-enter, but the
    /// `RefCell` inside still panics on a second `borrow_mut()` — nesting
    /// `with_state` calls from the same thread (the condition-variable shim
    /// calling into the semaphore shim, per spec.md §5) would otherwise
    /// panic instead of recursing. `try_borrow_mut` tells us which case
    /// we're in: on the outer call it succeeds normally; on a nested call
    /// it fails, and since the `ReentrantMutex` guarantees no other thread
    /// can be holding this lock at the same time, it's safe to reach through
    /// the existing borrow via a raw pointer instead of taking a new one.
    pub fn with_state<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Registry, &mut Gate) -> R,
    {
        let guard = self.state.lock();
        match guard.try_borrow_mut() {
            Ok(mut state) => {
                let State { registry, gate } = &mut *state;
                f(registry, gate)
            }
            Err(_) => {
                // SAFETY: only reached when this thread already holds the
                // `RefCell`'s mutable borrow via an outer `with_state` call
                // on the same thread; `ReentrantMutex` ensures no other
                // thread can be in this critical section concurrently, so
                // there is no data race in reaching through the same borrow.
                let state = unsafe { &mut *guard.as_ptr() };
                f(&mut state.registry, &mut state.gate)
            }
        }
    }

    pub fn verbose(&self) -> bool {
        self.config.verbose
    }
}

/// Build a standalone `Coordinator` backed by a throwaway temp file,
/// independent of the process-global singleton. Every module's unit tests,
/// and the integration tests under `tests/`, use this instead of
/// `init()`/`coordinator()` so that concurrently running `#[test]`s never
/// share mutable state through a single global registry. Gated behind the
/// `testing` feature (enabled for this crate's own dev-dependency on
/// itself) rather than `cfg(test)` alone, since integration test binaries
/// link the crate built without `cfg(test)`.
#[cfg(any(test, feature = "testing"))]
pub fn test_coordinator() -> (Coordinator, tempfile::NamedTempFile) {
    let gate_file = tempfile::NamedTempFile::new().unwrap();
    let coordinator = Coordinator {
        state: ReentrantMutex::new(RefCell::new(State {
            registry: Registry::new(),
            gate: Gate::open(gate_file.path().to_str().unwrap()).unwrap(),
        })),
        symbols: RealSymbols::resolve(),
        config: Config::default(),
    };
    (coordinator, gate_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial(libidle_env)]
    fn try_init_reports_state_file_failure_with_context() {
        // A path through a nonexistent directory can never be created.
        std::env::set_var("LIBIDLE_STATEFILE", "/nonexistent/dir/state");
        std::env::remove_var("LIBIDLE_VERBOSE");
        let err = try_init().expect_err("opening a state file in a missing directory must fail");
        assert!(err.to_string().contains("opening state file"));
        std::env::remove_var("LIBIDLE_STATEFILE");
    }

    #[test]
    fn with_state_is_reentrant_from_same_thread() {
        let (coordinator, _gate_file) = test_coordinator();
        coordinator.with_state(|registry, _gate| {
            registry.register_thread(1);
            // A nested call from the same thread must neither deadlock nor
            // panic on a double `RefCell` borrow.
            coordinator.with_state(|registry, _gate| {
                registry.register_thread(2);
            });
        });
        coordinator.with_state(|registry, _gate| {
            assert_eq!(registry.active_threads(), 2);
        });
    }
}
