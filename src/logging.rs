//! Tracing subscriber setup for the command-line tool.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV_VAR: &str = "STYLEBOOK_LOG";

/// The filter used when `STYLEBOOK_LOG` is unset or invalid.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "stylebook=debug,info"
    } else {
        "info"
    }
}

/// Install the global subscriber: events go to stderr, colored only on a terminal.
///
/// Calling it twice is harmless; the second call keeps the first subscriber.
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_target(verbose);

    let _ = tracing_subscriber::registry().with(filter).with(fmt).try_init();
}
