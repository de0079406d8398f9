//! Tracing setup: coloured stdout plus a plain-text log file.
//!
//! Set up before [`crate::Config`] is loaded, so it reads its own variables:
//! `LOG_DIR` (default `./logs`) and `LOG_ROTATION` (`never`, `hourly` or
//! `daily`; default `never`). `RUST_LOG` overrides the default filter, e.g.
//! `RUST_LOG=info,fleet_bridge=debug` to see every robot request.

use std::env;
use tracing_appender::non_blocking;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE: &str = "fleet-bridge.log";
const DEFAULT_FILTER: &str = "info,hyper=warn,hyper_util=warn,reqwest=warn,tower=warn,h2=warn";

#[derive(Debug, Clone)]
pub struct LogSettings {
    pub dir: String,
    pub rotation: Rotation,
}

impl LogSettings {
    pub fn from_env() -> Self {
        let rotation = match env::var("LOG_ROTATION").as_deref().map(str::trim) {
            Ok("daily") => Rotation::DAILY,
            Ok("hourly") => Rotation::HOURLY,
            _ => Rotation::NEVER,
        };
        Self {
            dir: env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string()),
            rotation,
        }
    }
}

/// Install the global subscriber. Keep the guard alive until exit or buffered
/// lines are lost.
pub fn init(settings: &LogSettings) -> WorkerGuard {
    let appender = RollingFileAppender::new(settings.rotation.clone(), &settings.dir, LOG_FILE);
    let (file_writer, guard) = non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_ansi(true))
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    guard
}
