// Diagnostic logging setup
//
// Library code only emits `tracing` events; the binary installs the
// subscriber once at startup.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "golden_prompt=info";
const VERBOSE_FILTER: &str = "golden_prompt=debug";

/// Filter directive used when `RUST_LOG` is unset.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        VERBOSE_FILTER
    } else {
        DEFAULT_FILTER
    }
}

/// Install a stderr `fmt` subscriber. `RUST_LOG` overrides the default filter.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
