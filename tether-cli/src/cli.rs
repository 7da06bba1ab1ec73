//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the job worker (entry point inside the engine process)
    Worker {
        /// Protocol root directory; defaults to $TETHER_ROOT, then the configuration
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,
    },

    /// Start the engine, run one payload, print the result and stop the engine
    Exec {
        /// File containing the payload
        #[arg(long, value_name = "FILE")]
        payload: PathBuf,

        /// Job timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Show the engine status record
    Status,

    /// Show the tail of the engine session log
    Logs {
        /// Number of lines
        #[arg(long, value_name = "N", default_value_t = 50)]
        lines: usize,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },

    /// API key management
    Keys {
        #[command(subcommand)]
        keys_cmd: KeysCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file (defaults to --config)
        #[arg(long, value_name = "PATH")]
        config_file: Option<PathBuf>,
    },

    /// Generate a sample configuration file
    Generate {
        /// Output file path; prints to stdout when omitted
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

#[derive(Subcommand, Debug)]
pub enum KeysCommands {
    /// Check whether a key is valid
    Check {
        key: String,
    },

    /// Add a key to the key file
    Add {
        key: String,

        /// Display name for the key owner
        #[arg(long, default_value = "User")]
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_worker_with_root() {
        let cli = Cli::try_parse_from(["tether", "worker", "--root", "/tmp/r"]).unwrap();
        match cli.command {
            Commands::Worker { root } => assert_eq!(root, Some(PathBuf::from("/tmp/r"))),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "tether",
            "exec",
            "--payload",
            "job.json",
            "--timeout",
            "5",
            "--log-level",
            "debug",
            "--config",
            "tether.yaml",
        ])
        .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config, Some(PathBuf::from("tether.yaml")));
        match cli.command {
            Commands::Exec { payload, timeout } => {
                assert_eq!(payload, PathBuf::from("job.json"));
                assert_eq!(timeout, Some(5));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_logs_default_lines() {
        let cli = Cli::try_parse_from(["tether", "logs"]).unwrap();
        assert!(matches!(cli.command, Commands::Logs { lines: 50 }));
    }

    #[test]
    fn test_exec_requires_payload() {
        assert!(Cli::try_parse_from(["tether", "exec"]).is_err());
    }

    #[test]
    fn test_keys_check() {
        let cli = Cli::try_parse_from(["tether", "keys", "check", "admin"]).unwrap();
        match cli.command {
            Commands::Keys {
                keys_cmd: KeysCommands::Check { key },
            } => assert_eq!(key, "admin"),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
