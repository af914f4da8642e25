//! # Stockguard Service
//!
//! Process wiring for the `stockguard` binary: environment configuration,
//! tracing, command parsing and the worker lifecycle.

pub mod cli;
pub mod config;
pub mod lifecycle;

pub use cli::{Cli, Command};
pub use config::{Config, ConfigError};
pub use lifecycle::{await_shutdown, shutdown_signal};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter `stockguard=info`.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stockguard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
