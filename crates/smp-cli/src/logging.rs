//! Log output to standard error.

use tracing_subscriber::EnvFilter;

/// Default filter for a verbosity count: warnings only, then info, then
/// debug for the SMP crates.
pub fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "warn,smp_protocol=debug,smp_uart=debug,smp_transport=debug,smp_client=debug,smp_cli=debug",
        _ => "trace",
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over
/// `verbose`. Calling this twice is harmless.
pub fn init(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose > 1)
        .try_init();
}
