//! Log setup. Everything goes to stderr so `--json` output stays clean.

use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins; otherwise `verbose` or the configured level
pub fn init(configured_level: &str, verbose: bool) {
    let fallback = if verbose { "debug" } else { configured_level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    // Already installed when called twice in one process
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
