//! Logging Setup
//!
//! Installs the global `tracing` subscriber for the binary. Logs always go to
//! stderr; stdout carries nothing but the JSON envelope.
//!
//! # Filtering
//! `RUST_LOG` wins when set. Otherwise the level comes from `--verbose`
//! (`warn` by default, `debug` with one flag, `trace` with two).

use std::io;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub verbosity: u8,
    pub format: LogFormat,
}

impl LoggingConfig {
    /// Level directive for this crate when `RUST_LOG` is not set
    #[must_use]
    pub const fn level(&self) -> &'static str {
        match self.verbosity {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    }

    fn filter(&self) -> EnvFilter {
        std::env::var("RUST_LOG").map_or_else(
            |_| EnvFilter::new(format!("warn,sprocket={}", self.level())),
            EnvFilter::new,
        )
    }

    /// Install the global subscriber
    ///
    /// A second call is a no-op, so tests and embedding binaries can call it freely.
    pub fn init(&self) {
        let registry = tracing_subscriber::registry().with(self.filter());

        let result = match self.format {
            LogFormat::Json => registry.with(fmt::layer().json().with_writer(io::stderr)).try_init(),
            LogFormat::Compact => registry.with(fmt::layer().compact().with_target(false).with_writer(io::stderr)).try_init(),
        };

        if result.is_ok() {
            tracing::debug!(level = self.level(), format = ?self.format, "logging initialised");
        }
    }
}
