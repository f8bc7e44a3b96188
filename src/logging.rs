// ABOUTME: tracing subscriber setup for the CLI
// ABOUTME: Logs go to stderr so stdout stays clean for command output

use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins when set; otherwise warnings only, or debug for this crate with `verbose`.
pub fn init(verbose: bool) {
    let fallback = if verbose { "warn,sheetkit=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    // A second init (e.g. from tests) is harmless
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
