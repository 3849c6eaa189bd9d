//! Tracing subscriber setup for binaries embedding the core.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "cnc_sim=info";

/// Installs a global subscriber: an [`EnvFilter`] from `RUST_LOG` (falling
/// back to [`DEFAULT_FILTER`]) and a `fmt` layer.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok()
}
