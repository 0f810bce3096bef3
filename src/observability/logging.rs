//! Structured logging.
//!
//! Uses `RUST_LOG` when set, otherwise the directive passed by the caller.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter for normal runs.
pub const DEFAULT_DIRECTIVE: &str = "hotvisor=info,tower_http=info";
/// Filter used by `--dump`, which should only print the merged config.
pub const QUIET_DIRECTIVE: &str = "hotvisor=warn";

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive.into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
