//! In-memory tables of known threads, semaphores, and condition variables.
//!
//! Looked up by identity (a stable address, reduced to `usize`). Containers
//! are unordered; removal may reorder survivors — callers must never rely
//! on index stability across a removal.

use std::collections::HashMap;

pub type SemaphoreId = usize;
pub type ConditionId = usize;
pub type ThreadId = libc::pthread_t;

/// Identity of the calling thread, for registry lookups.
pub fn current_thread_id() -> ThreadId {
    unsafe { libc::pthread_self() }
}

/// A spawned thread, tracked from the moment its birth is observed
/// (including the initial thread at process startup).
#[derive(Debug, Clone)]
pub struct ThreadRecord {
    pub sleeping: bool,
    pub forced_idle: bool,
    pub waiting_semaphore: Option<SemaphoreId>,
    /// Set once `pthread_join` has reaped this thread. A terminated thread
    /// is unconditionally blocked and excluded from `active_threads`.
    pub terminated: bool,
}

impl ThreadRecord {
    pub fn new() -> Self {
        Self {
            sleeping: false,
            forced_idle: false,
            waiting_semaphore: None,
            terminated: false,
        }
    }

    /// Invariant 1: a thread is blocked iff forced-idle, or sleeping with
    /// no semaphore link, or sleeping on a semaphore with no pending
    /// wakeup — or it has already been joined.
    pub fn is_blocked(&self, pending_wakeups: Option<u64>) -> bool {
        if self.terminated || self.forced_idle {
            return true;
        }
        if !self.sleeping {
            return false;
        }
        match (self.waiting_semaphore, pending_wakeups) {
            (None, _) => true,
            (Some(_), Some(pending)) => pending == 0,
            (Some(_), None) => true,
        }
    }
}

impl Default for ThreadRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// A POSIX semaphore, anonymous or named.
#[derive(Debug, Clone)]
pub struct SemaphoreRecord {
    /// Named (`sem_open`) semaphores may be posted by another process and
    /// are excluded from idle accounting entirely.
    pub named: bool,
    pub pending_wakeups: u64,
}

impl SemaphoreRecord {
    pub fn anonymous(initial_value: u32) -> Self {
        Self {
            named: false,
            pending_wakeups: initial_value as u64,
        }
    }

    pub fn named() -> Self {
        Self {
            named: true,
            pending_wakeups: 0,
        }
    }
}

/// A reimplemented condition variable: two internally-owned semaphores
/// (`IN`/`OUT`) that get rotated on every broadcast.
#[derive(Debug, Clone)]
pub struct ConditionRecord {
    pub sem_in: SemaphoreId,
    pub sem_out: SemaphoreId,
    pub sleeping_threads: u32,
}

#[derive(Default)]
pub struct Registry {
    threads: HashMap<ThreadId, ThreadRecord>,
    semaphores: HashMap<SemaphoreId, SemaphoreRecord>,
    conditions: HashMap<ConditionId, ConditionRecord>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // --- threads ---

    pub fn register_thread(&mut self, id: ThreadId) {
        self.threads.entry(id).or_insert_with(ThreadRecord::new);
    }

    pub fn thread(&self, id: ThreadId) -> Option<&ThreadRecord> {
        self.threads.get(&id)
    }

    pub fn thread_mut(&mut self, id: ThreadId) -> &mut ThreadRecord {
        self.threads
            .entry(id)
            .or_insert_with(ThreadRecord::new)
    }

    // --- semaphores ---

    pub fn insert_semaphore(&mut self, id: SemaphoreId, record: SemaphoreRecord) {
        self.semaphores.insert(id, record);
    }

    pub fn semaphore(&self, id: SemaphoreId) -> Option<&SemaphoreRecord> {
        self.semaphores.get(&id)
    }

    pub fn semaphore_mut(&mut self, id: SemaphoreId) -> Option<&mut SemaphoreRecord> {
        self.semaphores.get_mut(&id)
    }

    pub fn remove_semaphore(&mut self, id: SemaphoreId) -> Option<SemaphoreRecord> {
        self.semaphores.remove(&id)
    }

    // --- condition variables ---

    pub fn insert_condition(&mut self, id: ConditionId, record: ConditionRecord) {
        self.conditions.insert(id, record);
    }

    pub fn condition(&self, id: ConditionId) -> Option<&ConditionRecord> {
        self.conditions.get(&id)
    }

    pub fn condition_mut(&mut self, id: ConditionId) -> Option<&mut ConditionRecord> {
        self.conditions.get_mut(&id)
    }

    pub fn remove_condition(&mut self, id: ConditionId) -> Option<ConditionRecord> {
        self.conditions.remove(&id)
    }

    /// Number of threads that are not blocked, per invariant 1/2.
    pub fn active_threads(&self) -> usize {
        self.threads
            .values()
            .filter(|t| {
                let pending = t
                    .waiting_semaphore
                    .and_then(|s| self.semaphores.get(&s))
                    .map(|s| s.pending_wakeups);
                !t.is_blocked(pending)
            })
            .count()
    }

    /// Per-thread block map in a stable order, for diagnostics.
    pub fn block_map(&self) -> Vec<bool> {
        let mut ids: Vec<&ThreadId> = self.threads.keys().collect();
        ids.sort_by_key(|id| **id as usize);
        ids.into_iter()
            .map(|id| {
                let t = &self.threads[id];
                let pending = t
                    .waiting_semaphore
                    .and_then(|s| self.semaphores.get(&s))
                    .map(|s| s.pending_wakeups);
                t.is_blocked(pending)
            })
            .collect()
    }
}
