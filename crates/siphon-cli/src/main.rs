//! Siphon CLI — pull files from FTP/SFTP servers into blob storage.
//!
//! Configuration comes from the environment (and a .env file if present).
//! SIPHON_CONTAINER is required; see Config for the rest.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use siphon_cli::init_tracing;
use siphon_core::{Config, SourceList};
use siphon_pipeline::run_ingest;
use siphon_storage::create_store;

#[derive(Parser)]
#[command(name = "siphon", about = "FTP/SFTP to blob storage ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full ingest over the configured sources
    Ingest {
        /// Path to the sources JSON file (overrides SIPHON_SOURCES)
        #[arg(long)]
        sources: Option<std::path::PathBuf>,
    },
    /// List stored objects
    List {
        /// Only objects whose path starts with this prefix
        #[arg(long, default_value = "")]
        prefix: String,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse before anything else so --help works without configuration.
    let cli = Cli::parse();

    init_tracing();
    dotenvy::dotenv().ok();

    let config = Config::from_env()
        .context("Failed to load configuration. Set SIPHON_CONTAINER and storage settings")?;
    let store = create_store(&config)
        .await
        .context("Failed to create blob store")?;

    match cli.command {
        Commands::Ingest { sources } => {
            let sources_path = sources.unwrap_or_else(|| config.sources_path.clone());
            let sources = SourceList::from_file(&sources_path)?;
            if sources.is_empty() {
                tracing::warn!(path = %sources_path.display(), "No source entries configured");
            }
            // The report is informational; failed batches are visible in it
            // and in the logs but do not change the exit code.
            let report = run_ingest(&config, store, &sources).await?;
            print_json(&report)?;
        }
        Commands::List { prefix } => {
            let objects = store.list_objects(&prefix).await?;
            print_json(&objects)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    // Argument parsing needs no environment; config loading happens after.
    #[test]
    fn commands_parse_without_configuration() {
        let cli = Cli::try_parse_from(["siphon", "ingest", "--sources", "feeds.json"]).unwrap();
        assert!(matches!(cli.command, Commands::Ingest { sources: Some(p) } if p == std::path::PathBuf::from("feeds.json")));

        let cli = Cli::try_parse_from(["siphon", "list", "--prefix", "host_21/"]).unwrap();
        assert!(matches!(cli.command, Commands::List { prefix } if prefix == "host_21/"));
    }
}
