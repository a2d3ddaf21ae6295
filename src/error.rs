//! Error taxonomy for the idle-detection core.
//!
//! Per spec, most of these are not meant to be recovered from: symbol
//! resolution failure and registry-lookup-on-a-known-object failure are
//! contract violations and abort the process. `LibidleError` exists mainly
//! so the startup path (which is allowed to fail gracefully, unlike the
//! interposed hot path) can report *why* via `anyhow`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibidleError {
    #[error("failed to resolve real symbol `{0}` via dlsym(RTLD_NEXT, ..)")]
    SymbolResolution(&'static str),

    #[error("state file `{path}` could not be opened: {source}")]
    StateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("registry lookup failed for a record the caller guaranteed exists: {0}")]
    RegistryLookup(&'static str),

    #[error("condition variable destroyed with {0} sleeping thread(s)")]
    DestroyWithWaiters(u32),
}
