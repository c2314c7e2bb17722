//! Logging
//!
//! The core logs through `tracing`:
//!
//! - `info`: session connect, disconnect and reaping, schema installation
//! - `warn`: handler failures and truncated event chains
//! - `debug`: flush sizes, schema compilation, one span per dispatched event
//! - `trace`: individual field assignments
//!
//! Embedders that already install a subscriber can skip [`init_tracing`].

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `filter` (for example
/// `"info,relay_core=debug"`).
///
/// `RUST_LOG` overrides `filter` when it is set. Returns `false` if a global
/// subscriber was already installed, in which case nothing changes.
pub fn init_tracing(filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(build_env_filter(filter))
        .with_target(false)
        .try_init()
        .is_ok()
}

fn build_env_filter(filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
