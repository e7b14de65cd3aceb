//! Tracing subscriber setup for the command-line tool.

use tracing_subscriber::EnvFilter;

/// Logs to stderr. `RUST_LOG` wins over the verbosity flag when set.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "info,theme_import=debug"
    } else {
        "warn"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
