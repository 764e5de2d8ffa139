use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter directive to use when `RUST_LOG` is not set.
pub fn default_directive(configured: &str, verbose: bool) -> &str {
    if verbose { "debug" } else { configured }
}

/// Install the global fmt subscriber writing to stderr.
///
/// `RUST_LOG` wins over the configured filter. A directive that does not
/// parse falls back to `info`. Calling this twice is harmless.
pub fn init(configured: &str, verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(configured, verbose)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
