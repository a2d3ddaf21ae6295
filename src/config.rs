//! Environment-derived configuration.
//!
//! Resolved once, at constructor time, and stored in the Coordinator
//! singleton for the lifetime of the process. Sourced from environment
//! variables rather than a CLI/config file since this crate has no command
//! line of its own (it is loaded into someone else's process).

use std::env;

/// Default state-file path when `LIBIDLE_STATEFILE` is unset.
pub const DEFAULT_STATEFILE: &str = ".libidle_state";

#[derive(Debug, Clone)]
pub struct Config {
    pub state_file: String,
    pub verbose: bool,
}

impl Config {
    /// Build a `Config` from the process environment.
    pub fn from_env() -> Self {
        let state_file = env::var("LIBIDLE_STATEFILE").unwrap_or_else(|_| DEFAULT_STATEFILE.to_string());
        let verbose = env::var_os("LIBIDLE_VERBOSE")
            .map(|v| !v.is_empty())
            .unwrap_or(false);

        Self { state_file, verbose }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_file: DEFAULT_STATEFILE.to_string(),
            verbose: false,
        }
    }
}
