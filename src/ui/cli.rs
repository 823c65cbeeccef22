//! Command-line interface definition.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// SiteSentry: malware scanning and remediation for web installations
#[derive(Parser, Debug)]
#[command(name = "sitesentry")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Use an alternate configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine processing
    Json,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scan over the configured roots
    Scan {
        /// Scan specific path(s) instead of the configured roots
        #[arg(short, long)]
        path: Option<Vec<PathBuf>>,

        /// Resume the most recent paused run
        #[arg(short, long, conflicts_with = "path")]
        resume: bool,

        /// Detect only, never quarantine or repair
        #[arg(long)]
        no_action: bool,
    },

    /// Manage quarantined files
    Quarantine {
        #[command(subcommand)]
        action: QuarantineAction,
    },

    /// Verify core files against the canonical manifest
    Verify {
        /// Repair modified or missing core files in place
        #[arg(long)]
        repair: bool,

        /// Platform version to verify against (defaults to configured)
        #[arg(long)]
        version: Option<String>,
    },

    /// View scan run history
    History {
        /// Number of recent runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Quarantine subcommands.
#[derive(Subcommand, Debug)]
pub enum QuarantineAction {
    /// List quarantined files
    List,

    /// Restore a quarantined file to its original location
    Restore {
        /// ID of the record to restore
        id: String,
    },

    /// Delete a quarantined file permanently
    Delete {
        /// ID of the record to delete
        id: String,
    },

    /// Show vault usage
    Stats,

    /// Remove expired entries and enforce the vault size cap
    Prune,
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write a default configuration file
    Init,

    /// Print the configuration file location
    Path,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_scan() {
        let cli = Cli::try_parse_from(["sitesentry", "scan", "--resume"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Scan { resume: true, .. })
        ));
    }

    #[test]
    fn test_cli_resume_conflicts_with_path() {
        let result = Cli::try_parse_from(["sitesentry", "scan", "--resume", "--path", "/tmp"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parse_quarantine_restore() {
        let cli =
            Cli::try_parse_from(["sitesentry", "quarantine", "restore", "abc-123"]).unwrap();
        match cli.command {
            Some(Commands::Quarantine {
                action: QuarantineAction::Restore { id },
            }) => assert_eq!(id, "abc-123"),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
