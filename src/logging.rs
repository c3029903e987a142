//! Tracing subscriber setup shared by the server and the CLIs

use crate::config::LoggingConfig;
use crate::error::{AppError, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format.as_str() {
        "pretty" => registry.with(fmt::layer().pretty()).try_init(),
        _ => registry.with(fmt::layer().json()).try_init(),
    };

    installed.map_err(|e| AppError::Internal(format!("Failed to install tracing subscriber: {}", e)))
}
