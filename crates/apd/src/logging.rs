//! Tracing subscriber setup.
//!
//! Logs go to stderr so command output on stdout stays pipeable. `RUST_LOG`
//! overrides the default filter; `--debug` raises both crates to `debug`.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "apd=info,apd_core=info";
const DEBUG_FILTER: &str = "apd=debug,apd_core=debug";

pub fn init(debug: bool) {
    let filter = if debug {
        EnvFilter::new(DEBUG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };

    // A second init (tests calling into the CLI twice) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
