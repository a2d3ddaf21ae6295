//! Resolution of the "real" underlying primitives via `dlsym(RTLD_NEXT, ..)`.
//!
//! This is the one place the crate talks to `dlfcn`. A failure here is a
//! contract violation of the hosting environment (we're not actually
//! interposed on top of anything) and is fatal at startup, matching the
//! original `safe_dlsym_next`.

use std::ffi::CString;
use std::os::raw::c_void;

use libc::{c_char, c_int, c_uint, sockaddr, socklen_t, ssize_t, timespec};

/// Resolve `symbol` to the next definition in the dynamic symbol chain.
///
/// # Panics
/// Aborts the process (via `assert!`) if the symbol cannot be found — a
/// process that doesn't export `accept`/`recv`/`sem_wait`/etc. beneath us
/// isn't one this library can meaningfully observe.
pub fn resolve_next(symbol: &'static str) -> *mut c_void {
    let c_name = CString::new(symbol).expect("symbol name must not contain NUL");
    let ptr = unsafe { libc::dlsym(libc::RTLD_NEXT, c_name.as_ptr()) };
    assert!(!ptr.is_null(), "dlsym(RTLD_NEXT, \"{symbol}\") returned NULL — {}",
        "is this library actually LD_PRELOAD'd ahead of the real libc?");
    ptr
}

pub type AcceptFn = unsafe extern "C" fn(c_int, *mut sockaddr, *mut socklen_t) -> c_int;
pub type RecvFn = unsafe extern "C" fn(c_int, *mut c_void, usize, c_int) -> ssize_t;
pub type PthreadJoinFn = unsafe extern "C" fn(libc::pthread_t, *mut *mut c_void) -> c_int;
pub type PthreadCreateFn = unsafe extern "C" fn(
    *mut libc::pthread_t,
    *const libc::pthread_attr_t,
    extern "C" fn(*mut c_void) -> *mut c_void,
    *mut c_void,
) -> c_int;
pub type PthreadMutexLockFn = unsafe extern "C" fn(*mut libc::pthread_mutex_t) -> c_int;
pub type PthreadMutexUnlockFn = unsafe extern "C" fn(*mut libc::pthread_mutex_t) -> c_int;

pub type SemInitFn = unsafe extern "C" fn(*mut libc::sem_t, c_int, u32) -> c_int;
pub type SemDestroyFn = unsafe extern "C" fn(*mut libc::sem_t) -> c_int;
pub type SemPostFn = unsafe extern "C" fn(*mut libc::sem_t) -> c_int;
pub type SemWaitFn = unsafe extern "C" fn(*mut libc::sem_t) -> c_int;
pub type SemTimedwaitFn = unsafe extern "C" fn(*mut libc::sem_t, *const timespec) -> c_int;
// `sem_open` is variadic in its C prototype (`mode_t, unsigned` only appear
// when `O_CREAT` is passed), but variadic `extern "C" fn` items aren't
// stable in Rust. We declare the fixed 4-argument form instead: on the
// SysV/x86-64 and AArch64 ABIs, integer/pointer arguments are passed in the
// same registers whether or not the callee is variadic, so a call site
// passing 2 or 4 arguments still lines up with this signature — the same
// technique other Rust interposition shims use for `open(2)`'s `mode_t`.
pub type SemOpenFn = unsafe extern "C" fn(*const c_char, c_int, libc::mode_t, c_uint) -> *mut libc::sem_t;
pub type SemCloseFn = unsafe extern "C" fn(*mut libc::sem_t) -> c_int;
pub type SemUnlinkFn = unsafe extern "C" fn(*const c_char) -> c_int;

/// Holds every resolved real symbol, looked up once at ctor time.
pub struct RealSymbols {
    pub accept: AcceptFn,
    pub recv: RecvFn,
    pub pthread_join: PthreadJoinFn,
    pub pthread_create: PthreadCreateFn,
    pub pthread_mutex_lock: PthreadMutexLockFn,
    pub pthread_mutex_unlock: PthreadMutexUnlockFn,
    pub sem_init: SemInitFn,
    pub sem_destroy: SemDestroyFn,
    pub sem_post: SemPostFn,
    pub sem_wait: SemWaitFn,
    pub sem_timedwait: SemTimedwaitFn,
    pub sem_open: SemOpenFn,
    pub sem_close: SemCloseFn,
    pub sem_unlink: SemUnlinkFn,
}

macro_rules! resolve {
    ($name:literal, $ty:ty) => {
        unsafe { std::mem::transmute::<*mut c_void, $ty>(resolve_next($name)) }
    };
}

impl RealSymbols {
    /// Resolve every symbol this crate interposes. Called exactly once,
    /// from the process-global constructor.
    pub fn resolve() -> Self {
        Self {
            accept: resolve!("accept", AcceptFn),
            recv: resolve!("recv", RecvFn),
            pthread_join: resolve!("pthread_join", PthreadJoinFn),
            pthread_create: resolve!("pthread_create", PthreadCreateFn),
            pthread_mutex_lock: resolve!("pthread_mutex_lock", PthreadMutexLockFn),
            pthread_mutex_unlock: resolve!("pthread_mutex_unlock", PthreadMutexUnlockFn),
            sem_init: resolve!("sem_init", SemInitFn),
            sem_destroy: resolve!("sem_destroy", SemDestroyFn),
            sem_post: resolve!("sem_post", SemPostFn),
            sem_wait: resolve!("sem_wait", SemWaitFn),
            sem_timedwait: resolve!("sem_timedwait", SemTimedwaitFn),
            sem_open: resolve!("sem_open", SemOpenFn),
            sem_close: resolve!("sem_close", SemCloseFn),
            sem_unlink: resolve!("sem_unlink", SemUnlinkFn),
        }
    }
}

// Safety: every field is a plain function pointer, resolved once and never
// mutated; sharing it across threads is sound.
unsafe impl Send for RealSymbols {}
unsafe impl Sync for RealSymbols {}
