//! Diagnostic output.
//!
//! Verbosity is gated by `Config::verbose` (the `LIBIDLE_VERBOSE` env var):
//! any non-empty value enables diagnostic output. The sink is `tracing`,
//! initialized once from the ctor; callers never touch `tracing` directly,
//! they call `log_block_transition`.

use std::sync::Once;

static INIT: Once = Once::new();

/// Install the global `tracing` subscriber. Safe to call more than once;
/// only the first call has an effect.
pub fn init(verbose: bool) {
    INIT.call_once(|| {
        let filter = if verbose { "trace" } else { "warn" };
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
            .with_target(false)
            .try_init();
    });
}

/// Render the per-thread block map: one character per thread, `x` for
/// blocked, `-` for active, in registration order.
pub fn block_map(blocked: &[bool]) -> String {
    blocked.iter().map(|&b| if b { 'x' } else { '-' }).collect()
}

/// Log one blocked-op transition line, if verbose diagnostics are enabled.
pub fn log_block_transition(verbose: bool, event: &str, blocked: &[bool]) {
    if !verbose {
        return;
    }
    tracing::debug!(event, block_map = %block_map(blocked), "blocked-op transition");
}
