//! Diagnostic tracing for the execkit CLI.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. It is separate from
//! the launch diagnostics returned in results, which are always produced.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the filter is `warn`, or
/// `execkit=debug` when `verbose` is true. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=execkit=debug execkit run --timeout 5 -- /bin/sleep 1
/// ```
pub fn init(verbose: bool) -> Result<()> {
    let fallback = if verbose { "warn,execkit=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init()
        .map_err(|e| anyhow!("install tracing subscriber: {e}"))
}
