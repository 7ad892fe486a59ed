//! Telemetry and Observability
//!
//! Sets up `tracing-subscriber` for structured logging: config-driven log
//! level, `RUST_LOG` override, pretty output in debug builds and JSON in
//! release builds.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for `level`, applied to our crates and dependencies alike
pub fn default_filter(log_level: &str) -> String {
    format!(
        "{0},jellyship_engine={0},jellyship_release={0},sdk={0}",
        log_level
    )
}

/// Initialize the tracing subscriber with the given log level.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter > default "info"
///
/// Logs go to stderr so `--json` output on stdout stays parseable. Only the
/// first call installs a subscriber; later calls are no-ops.
pub fn init_telemetry_with_level(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }
}
