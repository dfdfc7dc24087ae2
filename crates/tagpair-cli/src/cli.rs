//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use uuid::Uuid;

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "tagpair")]
#[command(author, version, about = "Pair proximity tags with BLE peripherals", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Config file (defaults to <config dir>/tagpair/config.toml)
    #[arg(long, global = true, env = "TAGPAIR_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Reusable tag file argument
#[derive(Debug, Clone, Args)]
pub struct TagArgs {
    /// Tag file, or use TAGPAIR_TAG env var
    #[arg(long, env = "TAGPAIR_TAG")]
    pub tag: Option<PathBuf>,
}

/// Reusable radio arguments
#[derive(Debug, Clone, Args)]
pub struct RadioArgs {
    /// How long to run, in seconds
    #[arg(short = 'T', long)]
    pub timeout: Option<u64>,

    /// Restrict to peripherals offering this service (repeatable)
    #[arg(short, long = "service", value_name = "UUID")]
    pub services: Vec<Uuid>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write a pairing key and value to a tag file
    Encode {
        /// Pairing key
        #[arg(short, long)]
        key: String,

        /// Application value as JSON
        #[arg(long)]
        value: Option<String>,

        #[command(flatten)]
        tag: TagArgs,
    },

    /// Print the contents of a tag file
    Decode {
        #[command(flatten)]
        tag: TagArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List nearby peripherals that advertise a pairing key
    Scan {
        #[command(flatten)]
        radio: RadioArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Connect to the peripheral named by a tag and print its values
    Pair {
        #[command(flatten)]
        tag: TagArgs,

        #[command(flatten)]
        radio: RadioArgs,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_encode() {
        let cli = Cli::try_parse_from([
            "tagpair",
            "encode",
            "--key",
            "c20c8a91",
            "--value",
            r#"{"name":"lamp"}"#,
            "--tag",
            "lamp.tag",
        ])
        .unwrap();

        match cli.command {
            Commands::Encode { key, value, tag } => {
                assert_eq!(key, "c20c8a91");
                assert_eq!(value.as_deref(), Some(r#"{"name":"lamp"}"#));
                assert_eq!(tag.tag, Some(PathBuf::from("lamp.tag")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_pair_services() {
        let cli = Cli::try_parse_from([
            "tagpair",
            "-v",
            "pair",
            "--service",
            "0000180f-0000-1000-8000-00805f9b34fb",
            "-s",
            "0000180a-0000-1000-8000-00805f9b34fb",
            "-T",
            "20",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Pair { radio, .. } => {
                assert_eq!(radio.services.len(), 2);
                assert_eq!(radio.timeout, Some(20));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_service_uuid() {
        assert!(Cli::try_parse_from(["tagpair", "scan", "--service", "lamp"]).is_err());
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["tagpair", "-v", "-q", "decode"]).is_err());
    }
}
