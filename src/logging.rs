//! Logging configuration using tracing.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the logging system.
///
/// `RUST_LOG` selects the filter unless `verbose` forces `debug`; the default
/// is `warn` so that forwarded command output is not drowned in log lines.
pub fn init(verbose: bool, json: bool) -> anyhow::Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
    }

    Ok(())
}
