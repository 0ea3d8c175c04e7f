//! Tracing initialization.
//!
//! Log output goes to stderr so command output on stdout stays machine-readable. The filter is
//! taken from `RUST_LOG` when set, e.g. `RUST_LOG=roombook=debug`.

use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_FILTER: &str = "roombook=info,warn";

/// Initialize the global tracing subscriber with an env filter and a stderr fmt layer.
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()?;

    debug!("Telemetry initialized");
    Ok(())
}
