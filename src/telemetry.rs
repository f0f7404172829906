//! Tracing setup for hosts embedding the editing core.

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Install a global subscriber writing to stderr.
///
/// The filter comes from the config's `filter` directives when set,
/// otherwise from the `SCRIBE_LOG` environment variable with a
/// verbosity-derived default level. Calling this twice is a no-op.
pub fn init(verbosity: u8, logging: &LoggingConfig) {
    if !logging.stdout {
        return;
    }
    let filter = match &logging.filter {
        Some(directives) => EnvFilter::new(directives.clone()),
        None => EnvFilter::builder()
            .with_default_directive(level_from_verbosity(verbosity).into())
            .with_env_var("SCRIBE_LOG")
            .from_env_lossy(),
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);
    let result = match logging.stdout_format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    // Err means a subscriber is already installed; keep it.
    let _ = result;
}

fn level_from_verbosity(verbosity: u8) -> tracing::metadata::LevelFilter {
    match verbosity {
        0 => tracing::metadata::LevelFilter::ERROR,
        1 => tracing::metadata::LevelFilter::INFO,
        _ => tracing::metadata::LevelFilter::DEBUG,
    }
}
