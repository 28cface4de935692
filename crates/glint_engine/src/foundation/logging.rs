//! Logging setup
//!
//! The engine logs through the `log` facade. Applications call [`init`] or
//! [`init_with`] once at startup to install `env_logger`; later calls are
//! ignored so tests and embedders can call it freely.

use std::sync::Once;

pub use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};

static INIT: Once = Once::new();

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `env_logger` filter directives such as `glint_engine=debug`.
    /// `RUST_LOG` is used when this is `None`.
    pub filter: Option<String>,
    /// Include timestamps in log lines
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: None,
            timestamps: true,
        }
    }
}

/// Initialize the logging system from `RUST_LOG` (default level `info`)
pub fn init() {
    init_with(&LoggingConfig::default());
}

/// Initialize the logging system from a configuration
pub fn init_with(config: &LoggingConfig) {
    INIT.call_once(|| {
        let env = env_logger::Env::default().default_filter_or("info");
        let mut builder = env_logger::Builder::from_env(env);
        if let Some(filter) = &config.filter {
            builder.parse_filters(filter);
        }
        if !config.timestamps {
            builder.format_timestamp(None);
        }
        // A host may already have installed a logger
        if builder.try_init().is_err() {
            log::debug!("Logger already installed, keeping it");
        }
    });
}
