//! Telemetry and logging initialization
//!
//! Structured logging with `tracing` and `tracing-subscriber`. Logs go to
//! stderr so embedding applications keep stdout for themselves.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber
///
/// # Arguments
/// * `verbose` - If true, sets the engine's log level to DEBUG, otherwise INFO
/// * `json_format` - If true, outputs logs in JSON format for machine parsing
///
/// `RUST_LOG` takes precedence over both levels when set.
///
/// # Example
/// ```
/// ot_common::telemetry::init_tracing(false, false);
/// tracing::info!("client started");
/// ```
pub fn init_tracing(verbose: bool, json_format: bool) {
    let filter_level = if verbose {
        "debug,tokio=info"
    } else {
        "info"
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_level));

    // try_init: a host application may already own the global subscriber
    if json_format {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .compact(),
            )
            .with(env_filter)
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice() {
        init_tracing(false, false);
        // Second call must not panic
        init_tracing(true, true);
        tracing::info!("tracing initialized");
    }
}
