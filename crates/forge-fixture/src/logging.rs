//! Tracing setup for harness binaries and test suites
//!
//! Call [`init`] once from a binary that drives a [`crate::Server`], or
//! [`init_for_tests`] at the top of each integration test. Both read
//! `FORGE_FIXTURE_LOG` first, then `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter directives consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "FORGE_FIXTURE_LOG";

/// Keeps the SSH and HTTP stacks quiet unless asked for.
pub const DEFAULT_DIRECTIVES: &str = "info,russh=warn,hyper=warn,reqwest=warn";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Install a compact stderr subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init() -> Result<(), BoxError> {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact();

    tracing_subscriber::registry()
        .with(filter(lookup_env)?)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}

/// Install a subscriber whose output goes through the libtest capture, so
/// logs only show for failing tests. Later calls in the same process are
/// no-ops.
pub fn init_for_tests() {
    let Ok(filter) = filter(lookup_env) else {
        return;
    };
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer())
        .try_init();
}

fn lookup_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// The first non-empty of `FORGE_FIXTURE_LOG`, `RUST_LOG` and
/// [`DEFAULT_DIRECTIVES`]. Invalid directives are an error, not a fallback.
pub(crate) fn filter(lookup: impl Fn(&str) -> Option<String>) -> Result<EnvFilter, BoxError> {
    let directives = [LOG_ENV, EnvFilter::DEFAULT_ENV]
        .into_iter()
        .filter_map(&lookup)
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVES.to_string());
    Ok(EnvFilter::try_new(directives)?)
}
