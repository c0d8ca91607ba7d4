//! Logging settings and their environment overrides.

use std::str::FromStr;

/// Variable selecting the output format.
pub const ENV_LOG_FORMAT: &str = "WXBRIDGE_LOG_FORMAT";
/// Variable holding the filter directives. `RUST_LOG` is read when unset.
pub const ENV_LOG_LEVEL: &str = "WXBRIDGE_LOG_LEVEL";
/// Variable turning on file and line in each event.
pub const ENV_LOG_LOCATION: &str = "WXBRIDGE_LOG_LOCATION";

/// How events are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Multi-line, for a developer at a terminal.
    Pretty,
    /// One line per event.
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" | "text" => Ok(Self::Compact),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Subscriber settings for [`init_tracing`](super::init_tracing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directives, e.g. `warn,wxbridge_runtime=debug`.
    pub filter: String,
    /// Include file and line.
    pub location: bool,
    /// Include the event target.
    pub target: bool,
    /// Write to stderr so stdout stays free for command output.
    pub stderr: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Compact,
            filter: "info".to_string(),
            location: false,
            target: true,
            stderr: false,
        }
    }
}

impl TracingConfig {
    /// Defaults overridden by `WXBRIDGE_LOG_*` and `RUST_LOG`.
    pub fn from_env() -> Self {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`.
    ///
    /// Unknown formats are ignored with the current format kept.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(format) = lookup(ENV_LOG_FORMAT).and_then(|s| s.parse().ok()) {
            self.format = format;
        }
        if let Some(filter) = lookup(ENV_LOG_LEVEL).or_else(|| lookup("RUST_LOG")) {
            self.filter = filter;
        }
        if let Some(flag) = lookup(ENV_LOG_LOCATION) {
            self.location = matches!(flag.as_str(), "1" | "true" | "yes");
        }
        self
    }

    /// Set the output format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the filter directives.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Send output to stderr.
    pub fn log_to_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn parse_formats() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!(" pretty ".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Compact));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn env_overrides_defaults() {
        let config = TracingConfig::default().with_env(lookup(&[
            (ENV_LOG_FORMAT, "json"),
            (ENV_LOG_LEVEL, "debug"),
            ("RUST_LOG", "trace"),
            (ENV_LOG_LOCATION, "1"),
        ]));
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter, "debug");
        assert!(config.location);
    }

    #[test]
    fn rust_log_is_the_fallback_filter() {
        let config = TracingConfig::default().with_env(lookup(&[("RUST_LOG", "warn")]));
        assert_eq!(config.filter, "warn");
    }

    #[test]
    fn unknown_format_keeps_current() {
        let config = TracingConfig::default()
            .with_format(LogFormat::Pretty)
            .with_env(lookup(&[(ENV_LOG_FORMAT, "xml")]));
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn builder_methods() {
        let config = TracingConfig::default().with_filter("warn").log_to_stderr();
        assert_eq!(config.filter, "warn");
        assert!(config.stderr);
        assert!(config.target);
        assert_eq!(config.format, LogFormat::Compact);
    }
}
