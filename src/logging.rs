use tracing_subscriber::EnvFilter;

/// Environment variable holding a `tracing` filter directive
pub const LOG_ENV: &str = "VERSIONER_LOG";

/// Default filter for a `-v` count
fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the stderr subscriber.
///
/// `VERSIONER_LOG` wins over the verbosity flag. Calling this twice is
/// harmless; the second subscriber is simply not installed.
pub fn init_logging(verbosity: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(level_for(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
