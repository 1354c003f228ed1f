//! Logging configuration using tracing.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Pick the effective default level: quiet runs only show warnings and errors.
pub fn effective_level(level: &str, quiet: bool) -> &str {
    if quiet {
        "warn"
    } else {
        level
    }
}

/// Initialize logging with the specified level. `RUST_LOG` takes precedence.
pub fn init(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;

    Ok(())
}
