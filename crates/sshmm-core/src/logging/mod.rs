//! Structured logging for model training and decoding.
//!
//! Provides dual-mode logging on stderr:
//! - Human-readable console output for interactive use
//! - Machine-parseable JSON lines for pipelines
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the embedding application through [`init_logging`].

pub mod config;

pub use config::{LogConfig, LogFormat, LogLevel};

use std::io::IsTerminal;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Stable event names attached to log records as the `event` field.
pub mod event_names {
    pub const TRAIN_STARTED: &str = "train.started";
    pub const TRAIN_FINISHED: &str = "train.finished";
    pub const MODEL_STATS: &str = "model.stats";
    pub const MODEL_SAVED: &str = "model.saved";
    pub const MODEL_LOADED: &str = "model.loaded";
    pub const DECODE_STEP: &str = "decode.step";
    pub const DECODE_BATCH: &str = "decode.batch";
}

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed, so repeated calls
/// (for example from several tests) are harmless.
pub fn init_logging(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_new(config.filter_directives())
        .unwrap_or_else(|_| EnvFilter::new(format!("sshmm_core={}", config.level)));

    match config.format {
        LogFormat::Human => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(std::io::stderr().is_terminal());
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
                .is_ok()
        }
        LogFormat::Jsonl => {
            let json_layer = fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(filter)
                .with(json_layer)
                .try_init()
                .is_ok()
        }
    }
}

/// Initialize logging from the environment alone.
pub fn init_default_logging() -> bool {
    init_logging(&LogConfig::from_env(None, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_harmless() {
        let config = LogConfig::default().with_level(LogLevel::Off);
        let _ = init_logging(&config);
        assert!(!init_logging(&config));
    }
}
