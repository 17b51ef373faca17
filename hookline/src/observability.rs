//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use crate::{
    config::Config,
    error::{Error, Result},
};

/// Initialize tracing
///
/// `RUST_LOG` wins over `service.log_level` when set. Output is JSON unless
/// `service.log_format` is `"pretty"`.
pub fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    let result = match config.service.log_format.as_str() {
        "pretty" => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init(),
    };
    result.map_err(|e| Error::Internal(format!("Failed to initialize tracing: {}", e)))?;

    tracing::info!("Tracing initialized for service: {}", config.service.name);

    Ok(())
}
