//! Process-wide quiescence detector, loaded via `LD_PRELOAD` ahead of libc.
//!
//! Interposes `accept`, `recv`, `pthread_create`/`pthread_join`, POSIX
//! semaphores, and (by full reimplementation atop semaphores) condition
//! variables, publishing a monotonic idle counter to a state file guarded
//! by an advisory file lock. See `DESIGN.md` for the full state machine;
//! this module is just the exported C surface.

pub mod blocking;
pub mod condvar;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod evaluator;
pub mod forced_idle;
pub mod gate;
pub mod io;
pub mod logging;
pub mod registry;
pub mod semaphore;
pub mod symbols;

pub use error::LibidleError;
pub use forced_idle::{disable_forced_idle, enable_forced_idle};

use std::os::raw::{c_char, c_int, c_uint, c_void};

use libc::{mode_t, sockaddr, socklen_t, ssize_t, timespec};

use coordinator::coordinator;

/// Process-global initializer. Runs once before `main`, equivalent to a
/// C constructor attribute. Resolves real symbols, opens the state file,
/// registers the initial thread, and performs the initial busy transition.
#[ctor::ctor]
fn on_load() {
    coordinator::init();
}

// ---------------------------------------------------------------------
// Blocking I/O and thread lifecycle
// ---------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn accept(sockfd: c_int, addr: *mut sockaddr, addrlen: *mut socklen_t) -> c_int {
    let c = coordinator();
    io::accept(c, || unsafe { (c.symbols.accept)(sockfd, addr, addrlen) })
}

#[no_mangle]
pub extern "C" fn recv(sockfd: c_int, buf: *mut c_void, len: usize, flags: c_int) -> ssize_t {
    let c = coordinator();
    io::recv(c, || unsafe { (c.symbols.recv)(sockfd, buf, len, flags) })
}

#[no_mangle]
pub extern "C" fn pthread_join(thread: libc::pthread_t, retval: *mut *mut c_void) -> c_int {
    let c = coordinator();
    io::join(c, thread, || unsafe { (c.symbols.pthread_join)(thread, retval) })
}

#[no_mangle]
pub extern "C" fn pthread_create(
    thread: *mut libc::pthread_t,
    attr: *const libc::pthread_attr_t,
    start_routine: extern "C" fn(*mut c_void) -> *mut c_void,
    arg: *mut c_void,
) -> c_int {
    io::create(thread, attr, start_routine, arg)
}

// ---------------------------------------------------------------------
// Semaphores
// ---------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn sem_init(sem: *mut libc::sem_t, pshared: c_int, value: c_uint) -> c_int {
    let c = coordinator();
    let rc = unsafe { (c.symbols.sem_init)(sem, pshared, value) };
    if rc == 0 {
        semaphore::on_create_anonymous(c, semaphore::id_of(sem), value);
    }
    rc
}

#[no_mangle]
pub extern "C" fn sem_destroy(sem: *mut libc::sem_t) -> c_int {
    let c = coordinator();
    semaphore::on_destroy(c, semaphore::id_of(sem));
    unsafe { (c.symbols.sem_destroy)(sem) }
}

#[no_mangle]
pub extern "C" fn sem_post(sem: *mut libc::sem_t) -> c_int {
    let c = coordinator();
    semaphore::record_post(c, semaphore::id_of(sem));
    unsafe { (c.symbols.sem_post)(sem) }
}

#[no_mangle]
pub extern "C" fn sem_wait(sem: *mut libc::sem_t) -> c_int {
    let c = coordinator();
    let id = semaphore::id_of(sem);
    semaphore::run_wait(c, id, || {
        let rc = unsafe { (c.symbols.sem_wait)(sem) };
        (rc, rc == 0)
    })
}

#[no_mangle]
pub extern "C" fn sem_timedwait(sem: *mut libc::sem_t, abs_timeout: *const timespec) -> c_int {
    let c = coordinator();
    let id = semaphore::id_of(sem);
    semaphore::run_wait(c, id, || {
        let rc = unsafe { (c.symbols.sem_timedwait)(sem, abs_timeout) };
        (rc, rc == 0)
    })
}

/// `sem_open`'s C prototype is variadic; see `symbols::SemOpenFn` for why
/// this crate declares a fixed 4-argument form instead. `mode`/`value` are
/// simply unused by the real implementation when `oflag` doesn't include
/// `O_CREAT`, matching a normal two-argument `sem_open(name, oflag)` call.
#[no_mangle]
pub extern "C" fn sem_open(
    name: *const c_char,
    oflag: c_int,
    mode: mode_t,
    value: c_uint,
) -> *mut libc::sem_t {
    let c = coordinator();
    let sem = unsafe { (c.symbols.sem_open)(name, oflag, mode, value) };
    if !sem.is_null() {
        semaphore::on_create_named(c, semaphore::id_of(sem));
    }
    sem
}

#[no_mangle]
pub extern "C" fn sem_close(sem: *mut libc::sem_t) -> c_int {
    let c = coordinator();
    semaphore::on_destroy(c, semaphore::id_of(sem));
    unsafe { (c.symbols.sem_close)(sem) }
}

#[no_mangle]
pub extern "C" fn sem_unlink(name: *const c_char) -> c_int {
    let c = coordinator();
    unsafe { (c.symbols.sem_unlink)(name) }
}

// ---------------------------------------------------------------------
// Condition variables (reimplemented end-to-end; the native
// `pthread_cond_t` storage is never touched beyond borrowing its address
// as a registry key)
// ---------------------------------------------------------------------

fn cond_id(cond: *mut libc::pthread_cond_t) -> registry::ConditionId {
    cond as registry::ConditionId
}

#[no_mangle]
pub extern "C" fn pthread_cond_init(
    cond: *mut libc::pthread_cond_t,
    _attr: *const libc::pthread_condattr_t,
) -> c_int {
    condvar::on_init(coordinator(), cond_id(cond));
    0
}

#[no_mangle]
pub extern "C" fn pthread_cond_destroy(cond: *mut libc::pthread_cond_t) -> c_int {
    match condvar::on_destroy(coordinator(), cond_id(cond)) {
        Ok(()) => 0,
        Err(LibidleError::DestroyWithWaiters(n)) => {
            panic!("pthread_cond_destroy called with {n} sleeping waiter(s)");
        }
        Err(e) => panic!("pthread_cond_destroy: {e}"),
    }
}

fn lock_user_mutex(
    c: &'static coordinator::Coordinator,
    mutex: *mut libc::pthread_mutex_t,
) -> impl FnOnce() + 'static {
    move || unsafe {
        (c.symbols.pthread_mutex_lock)(mutex);
    }
}

fn unlock_user_mutex(
    c: &'static coordinator::Coordinator,
    mutex: *mut libc::pthread_mutex_t,
) -> impl FnOnce() + 'static {
    move || unsafe {
        (c.symbols.pthread_mutex_unlock)(mutex);
    }
}

#[no_mangle]
pub extern "C" fn pthread_cond_wait(
    cond: *mut libc::pthread_cond_t,
    mutex: *mut libc::pthread_mutex_t,
) -> c_int {
    let c = coordinator();
    match condvar::wait(c, cond_id(cond), unlock_user_mutex(c, mutex), lock_user_mutex(c, mutex)) {
        Ok(()) => 0,
        Err(e) => panic!("pthread_cond_wait: {e}"),
    }
}

#[no_mangle]
pub extern "C" fn pthread_cond_timedwait(
    cond: *mut libc::pthread_cond_t,
    mutex: *mut libc::pthread_mutex_t,
    abstime: *const timespec,
) -> c_int {
    let c = coordinator();
    match condvar::timedwait(c, cond_id(cond), unlock_user_mutex(c, mutex), lock_user_mutex(c, mutex), abstime) {
        Ok(true) => libc::ETIMEDOUT,
        Ok(false) => 0,
        Err(e) => panic!("pthread_cond_timedwait: {e}"),
    }
}

#[no_mangle]
pub extern "C" fn pthread_cond_signal(cond: *mut libc::pthread_cond_t) -> c_int {
    match condvar::broadcast(coordinator(), cond_id(cond)) {
        Ok(()) => 0,
        Err(e) => panic!("pthread_cond_signal: {e}"),
    }
}

#[no_mangle]
pub extern "C" fn pthread_cond_broadcast(cond: *mut libc::pthread_cond_t) -> c_int {
    match condvar::broadcast(coordinator(), cond_id(cond)) {
        Ok(()) => 0,
        Err(e) => panic!("pthread_cond_broadcast: {e}"),
    }
}
