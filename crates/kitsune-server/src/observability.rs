//! Log output for the server process.
//!
//! The subscriber is installed once, before configuration is loaded, at the
//! `info` level. After loading, [`apply_logging_level`] swaps in the
//! `[logging] level` from the config file. An explicit `RUST_LOG` pins the
//! filter for the lifetime of the process.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

static FILTER: OnceLock<FilterHandle> = OnceLock::new();

pub fn init_tracing() {
    init_tracing_with_level("info");
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init_tracing_with_level(level: &str) {
    let filter = env_filter().unwrap_or_else(|| EnvFilter::new(level));
    let (filter, handle) = reload::Layer::new(filter);

    if tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok()
    {
        let _ = FILTER.set(handle);
    }
}

/// Replaces the active filter with `level` unless `RUST_LOG` is set.
pub fn apply_logging_level(level: &str) {
    if env_filter().is_some() {
        return;
    }
    let Some(handle) = FILTER.get() else {
        return;
    };
    if let Err(e) = handle.reload(EnvFilter::new(level)) {
        tracing::warn!(error = %e, level, "Could not change log level");
    }
}

fn env_filter() -> Option<EnvFilter> {
    std::env::var_os(EnvFilter::DEFAULT_ENV)?;
    EnvFilter::try_from_default_env().ok()
}
