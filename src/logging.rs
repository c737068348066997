//! Diagnostic logging setup for the binary.
//!
//! Library code only emits `tracing` events. The binary installs a
//! stderr `fmt` subscriber so stdout stays clean for command output.

use tracing_subscriber::EnvFilter;

/// Filter directive for a given `-v` count and `-q` flag.
pub fn filter_directive(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info,sealvault=debug",
        _ => "trace",
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// verbosity flags. Calling it twice is harmless.
pub fn init(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(verbose, quiet)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
