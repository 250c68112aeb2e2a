//! Logging setup for perfwatchctl
//!
//! Diagnostics go to stderr so `--json` output on stdout stays parseable.
//! Filter priority:
//! 1. `-v` (debug)
//! 2. $PERFWATCH_LOG (any EnvFilter directive, e.g. `perfwatch_common=debug`)
//! 3. `warn`

use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "PERFWATCH_LOG";

fn filter(verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
}

pub fn init(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
