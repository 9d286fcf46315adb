//! Observability for recovery runs
//!
//! Two separate channels:
//!
//! - Progress for humans goes through a [`Reporter`], driven by typed
//!   [`RecoveryEvent`]s. Reporters observe only; removing one never changes
//!   what is recovered.
//! - Diagnostics go through `tracing` to stderr, filtered by `RUST_LOG`.
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on execution
//! 3. No async or background threads

mod events;
mod reporter;

pub use events::RecoveryEvent;
pub use reporter::{ConsoleReporter, MemoryReporter, NullReporter, Reporter};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Installs the global `tracing` subscriber writing to stderr.
///
/// `RUST_LOG` wins over `default_filter` when set.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(default_filter: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let fmt_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
    Registry::default().with(filter).with(fmt_layer).try_init()
}
