use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install the process-wide subscriber. Logs go to stderr so command output on
/// stdout stays machine-readable.
pub fn init(quiet: bool) {
    INIT.call_once(|| {
        let filter = if quiet {
            EnvFilter::new("error")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
        };
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(!quiet)
            .with_writer(std::io::stderr)
            .init();
    });
}
