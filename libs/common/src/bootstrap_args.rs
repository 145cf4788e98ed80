//! Common command-line arguments for VoltageEMS services
//!
//! Individual services flatten or reuse this structure.

use std::path::PathBuf;

#[cfg(feature = "cli")]
use clap::Parser;

/// Common service startup arguments
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "cli", derive(Parser))]
#[cfg_attr(feature = "cli", clap(author, version, about))]
pub struct ServiceArgs {
    /// Configuration file (YAML, TOML or JSON)
    #[cfg_attr(feature = "cli", clap(short = 'c', long, env = "CONFIG_PATH"))]
    pub config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[cfg_attr(feature = "cli", clap(short = 'l', long, env = "RUST_LOG"))]
    pub log_level: Option<String>,

    /// Disable colored output (useful for log files)
    #[cfg_attr(feature = "cli", clap(long))]
    pub no_color: bool,

    /// Only validate configuration without starting service
    #[cfg_attr(feature = "cli", clap(long))]
    pub validate: bool,
}

impl ServiceArgs {
    /// Parse a log level string to `tracing::Level`, defaulting to INFO
    pub fn parse_level(level: &str) -> tracing::Level {
        match level.to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "warn" | "warning" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }

    /// Effective log level: CLI override first, then `configured`
    pub fn effective_log_level(&self, configured: &str) -> String {
        self.log_level
            .clone()
            .filter(|level| !level.trim().is_empty())
            .unwrap_or_else(|| configured.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = ServiceArgs::default();
        assert!(args.config.is_none());
        assert!(args.log_level.is_none());
        assert!(!args.validate);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(ServiceArgs::parse_level("debug"), tracing::Level::DEBUG);
        assert_eq!(ServiceArgs::parse_level("WARN"), tracing::Level::WARN);
        assert_eq!(ServiceArgs::parse_level("invalid"), tracing::Level::INFO);
    }

    #[test]
    fn test_effective_log_level() {
        let args = ServiceArgs::default();
        assert_eq!(args.effective_log_level("warn"), "warn");

        let args = ServiceArgs {
            log_level: Some("trace".to_string()),
            ..Default::default()
        };
        assert_eq!(args.effective_log_level("warn"), "trace");
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_parse_cli() {
        let args = ServiceArgs::try_parse_from([
            "samplersrv",
            "--config",
            "config/samplersrv.yaml",
            "--validate",
        ])
        .unwrap();
        assert_eq!(
            args.config.as_deref(),
            Some(std::path::Path::new("config/samplersrv.yaml"))
        );
        assert!(args.validate);
    }
}
