//! Process-wide `tracing` subscriber setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, Settings};

/// Installs the global subscriber, writing to stderr so command output on
/// stdout stays machine-readable.
///
/// `RUST_LOG` takes precedence over `Settings::log_level`; `verbose` forces
/// `debug` regardless of both.
///
/// # Errors
///
/// Returns an error if the filter directive is invalid or a global subscriber
/// is already installed.
pub fn init(settings: &Settings, verbose: bool) -> anyhow::Result<()> {
    let filter = if verbose {
        EnvFilter::try_new("debug")?
    } else {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&settings.log_level)?,
        }
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match settings.log_format {
        LogFormat::Json => registry.with(fmt::layer().json().with_writer(std::io::stderr)).try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("log subscriber already initialized: {e}"))
}
