mod cli;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::{cmd_decode, cmd_encode, cmd_pair, cmd_scan};
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref());
    let quiet = cli.quiet;

    match cli.command {
        Commands::Encode { key, value, tag } => {
            let path = config.resolve_tag(tag.tag);
            cmd_encode(&key, value.as_deref(), &path, quiet).await
        }
        Commands::Decode { tag, format } => {
            let path = config.resolve_tag(tag.tag);
            cmd_decode(&path, format).await
        }
        Commands::Scan { radio, format } => {
            let timeout = config.resolve_timeout(radio.timeout);
            let services = config.resolve_services(radio.services);
            cmd_scan(timeout, services, format, quiet, &config).await
        }
        Commands::Pair { tag, radio } => {
            let path = config.resolve_tag(tag.tag);
            let timeout = config.resolve_timeout(radio.timeout);
            let services = config.resolve_services(radio.services);
            cmd_pair(&path, timeout, services, quiet, &config).await
        }
    }
}
