//! Pure evaluator over a `Registry` snapshot: decides whether a lock/unlock
//! transition needs to happen. Always called with the Coordinator Mutex
//! held; never blocks.

use crate::gate::Gate;
use crate::registry::Registry;

/// Invoked after a state change that could have reduced `active_threads`.
/// If the gate is locked and nobody is active anymore, perform the idle
/// transition.
pub fn maybe_unlock(registry: &Registry, gate: &mut Gate) {
    if gate.locked() && registry.active_threads() == 0 {
        gate.go_idle();
    }
}

/// Invoked after a state change that could have increased `active_threads`.
/// If the gate is unlocked and someone just became active, perform the
/// busy transition.
///
/// This may block: acquiring the exclusive file lock can stall the calling
/// thread if an external harness is holding it open, which is the whole
/// point of the barrier.
pub fn maybe_lock(registry: &Registry, gate: &mut Gate) {
    if !gate.locked() && registry.active_threads() > 0 {
        gate.go_busy();
    }
}
