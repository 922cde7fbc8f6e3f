//! Logging configuration.
//!
//! Resolved from `SSHMM_LOG` (falling back to `RUST_LOG`) and
//! `SSHMM_LOG_FORMAT`, then overridden by whatever the embedding application
//! passes explicitly.

/// Environment variable holding the log level.
pub const ENV_LOG_LEVEL: &str = "SSHMM_LOG";

/// Environment variable holding the log format.
pub const ENV_LOG_FORMAT: &str = "SSHMM_LOG_FORMAT";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable console format (default).
    #[default]
    Human,
    /// One JSON object per line.
    Jsonl,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(LogFormat::Human),
            "jsonl" => Ok(LogFormat::Jsonl),
            _ => Err(format!("unknown log format: {}", s)),
        }
    }
}

/// Minimum level for events from the sshmm crates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Per-pair decode scores.
    Trace,
    /// Hash rebuilds and config resolution.
    Debug,
    /// Training summaries and model load/save (default).
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_lowercase();
        [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
            LogLevel::Off,
        ]
        .into_iter()
        .find(|level| level.as_str() == s)
        .ok_or_else(|| format!("unknown log level: {}", s))
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Raw `RUST_LOG` directives, used when no sshmm-specific level was given.
    pub directives: Option<String>,
}

impl LogConfig {
    /// Create config from the process environment and explicit overrides.
    pub fn from_env(level: Option<LogLevel>, format: Option<LogFormat>) -> Self {
        Self::from_vars(
            std::env::var(ENV_LOG_LEVEL).ok(),
            std::env::var("RUST_LOG").ok(),
            std::env::var(ENV_LOG_FORMAT).ok(),
            level,
            format,
        )
    }

    fn from_vars(
        sshmm_log: Option<String>,
        rust_log: Option<String>,
        log_format: Option<String>,
        level: Option<LogLevel>,
        format: Option<LogFormat>,
    ) -> Self {
        let mut config = LogConfig::default();

        // SSHMM_LOG takes precedence over RUST_LOG
        if let Some(level) = sshmm_log.and_then(|v| v.parse::<LogLevel>().ok()) {
            config.level = level;
        } else if let Some(val) = rust_log {
            config.directives = Some(val);
        }

        if let Some(format) = log_format.and_then(|v| v.parse::<LogFormat>().ok()) {
            config.format = format;
        }

        if let Some(level) = level {
            config = config.with_level(level);
        }
        if let Some(format) = format {
            config.format = format;
        }

        config
    }

    /// Set log level, dropping any inherited directives.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self.directives = None;
        self
    }

    /// Filter directives applied by the subscriber.
    pub fn filter_directives(&self) -> String {
        match &self.directives {
            Some(directives) => directives.clone(),
            None => format!("sshmm_core={0},sshmm_sparse={0}", self.level),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_both_crates_at_info() {
        let config = LogConfig::from_vars(None, None, None, None, None);
        assert_eq!(config, LogConfig::default());
        assert_eq!(config.format, LogFormat::Human);
        assert_eq!(
            config.filter_directives(),
            "sshmm_core=info,sshmm_sparse=info"
        );
    }

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!("TRACE".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!("off".parse::<LogLevel>().unwrap(), LogLevel::Off);
        assert!("verbose".parse::<LogLevel>().is_err());
        assert_eq!("Jsonl".parse::<LogFormat>().unwrap(), LogFormat::Jsonl);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn sshmm_log_beats_rust_log() {
        let config = LogConfig::from_vars(
            Some("warn".into()),
            Some("debug".into()),
            None,
            None,
            None,
        );
        assert_eq!(config.level, LogLevel::Warn);
        assert_eq!(config.directives, None);
        assert_eq!(config.filter_directives(), "sshmm_core=warn,sshmm_sparse=warn");
    }

    #[test]
    fn rust_log_directives_pass_through() {
        let config = LogConfig::from_vars(
            Some("chatty".into()),
            Some("sshmm_core::decode=trace".into()),
            Some("jsonl".into()),
            None,
            None,
        );
        assert_eq!(config.format, LogFormat::Jsonl);
        assert_eq!(config.filter_directives(), "sshmm_core::decode=trace");
    }

    #[test]
    fn explicit_level_drops_inherited_directives() {
        let config = LogConfig::from_vars(
            None,
            Some("sshmm_core=trace".into()),
            Some("jsonl".into()),
            Some(LogLevel::Error),
            Some(LogFormat::Human),
        );
        assert_eq!(config.level, LogLevel::Error);
        assert_eq!(config.format, LogFormat::Human);
        assert_eq!(
            config.filter_directives(),
            "sshmm_core=error,sshmm_sparse=error"
        );
    }
}
