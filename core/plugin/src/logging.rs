//! Logging setup for hosts embedding the plugin.

use tracing_subscriber::EnvFilter;

/// Install a global stderr subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level is `debug` for verbose
/// hosts and `info` for everyone else. Calling this when a subscriber is
/// already installed is a no-op, so hosts with their own logging keep it.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
