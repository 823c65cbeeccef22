//! Logging infrastructure for SiteSentry.

use crate::core::config::Config;
use crate::core::error::Result;
use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

/// Logging configuration.
pub struct LogConfig {
    /// Log level
    pub level: LevelFilter,
    /// Show timestamps
    pub timestamps: bool,
    /// Show module path
    pub module_path: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            timestamps: true,
            module_path: false,
        }
    }
}

impl LogConfig {
    /// Create a log config from application config.
    pub fn from_config(config: &Config) -> Self {
        let level = match config.logging.log_level.to_lowercase().as_str() {
            "trace" => LevelFilter::Trace,
            "debug" => LevelFilter::Debug,
            "info" => LevelFilter::Info,
            "warn" | "warning" => LevelFilter::Warn,
            "error" => LevelFilter::Error,
            _ => LevelFilter::Info,
        };

        let level = if config.logging.verbose_console && level < LevelFilter::Debug {
            LevelFilter::Debug
        } else {
            level
        };

        Self {
            level,
            timestamps: true,
            module_path: level >= LevelFilter::Debug,
        }
    }

    /// Create a verbose log config for CLI.
    pub fn verbose() -> Self {
        Self {
            level: LevelFilter::Debug,
            timestamps: true,
            module_path: true,
        }
    }

    /// Create a quiet log config (errors only).
    pub fn quiet() -> Self {
        Self {
            level: LevelFilter::Error,
            timestamps: false,
            module_path: false,
        }
    }
}

/// Initialize the logging system.
pub fn init_logging(config: LogConfig) -> Result<()> {
    let mut builder = Builder::new();

    builder.filter_level(config.level);

    builder.format(move |buf, record| {
        let mut output = String::new();

        if config.timestamps {
            output.push_str(&format!("{} ", Local::now().format("%Y-%m-%d %H:%M:%S")));
        }

        let level_str = match record.level() {
            log::Level::Error => "\x1b[31mERROR\x1b[0m",
            log::Level::Warn => "\x1b[33mWARN\x1b[0m ",
            log::Level::Info => "\x1b[32mINFO\x1b[0m ",
            log::Level::Debug => "\x1b[34mDEBUG\x1b[0m",
            log::Level::Trace => "\x1b[35mTRACE\x1b[0m",
        };
        output.push_str(&format!("[{}] ", level_str));

        if config.module_path {
            if let Some(path) = record.module_path() {
                output.push_str(&format!("{}: ", path));
            }
        }

        output.push_str(&format!("{}", record.args()));

        writeln!(buf, "{}", output)
    });

    builder.init();

    log::debug!("Logging initialized with level: {:?}", config.level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, LevelFilter::Info);
        assert!(config.timestamps);
    }

    #[test]
    fn test_log_config_verbose() {
        let config = LogConfig::verbose();
        assert_eq!(config.level, LevelFilter::Debug);
        assert!(config.module_path);
    }

    #[test]
    fn test_log_config_quiet() {
        let config = LogConfig::quiet();
        assert_eq!(config.level, LevelFilter::Error);
        assert!(!config.timestamps);
    }
}
