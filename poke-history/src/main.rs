//! poke-history - Inspect and repair the publish history

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use libpokecast::config::{expand_path, HistoryConfig};
use libpokecast::history::LocalHistory;
use libpokecast::logging::LoggingConfig;
use libpokecast::{open_history, CandidateId, Config};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "poke-history")]
#[command(version, about = "Inspect and repair the publish history")]
#[command(long_about = r#"Inspect and repair the publish history used by poke-post.

Works against whichever backend the config selects (local file, S3, or GCS).

EXAMPLES:
    # Has #25 been published?
    poke-history check 25

    # Backfill an id whose history write failed after posting
    poke-history record 25

    # List every recorded id (local backend only)
    poke-history list
    poke-history list --format json | jq length

EXIT CODES:
    0 - Success (for check: the id is recorded)
    1 - Error, or for check: the id is not recorded
"#)]
struct Args {
    /// Path to the config file
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: HistoryCommand,
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    /// Check whether an id has been published
    Check {
        /// Candidate id
        id: CandidateId,
    },
    /// Record an id as published without posting
    Record {
        /// Candidate id
        id: CandidateId,
    },
    /// List recorded ids in ascending order
    List {
        /// Output format
        #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    LoggingConfig::from_env(args.verbose).init();

    tracing::debug!("poke-history started with args: {:?}", args);

    let config = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load_or_default(),
    }
    .context("Failed to load configuration")?;

    match args.command {
        HistoryCommand::Check { id } => {
            let history = open_history(&config.history)
                .await
                .context("Failed to open history")?;
            let published = history
                .exists(id)
                .await
                .with_context(|| format!("Failed to check #{}", id))?;

            if published {
                println!("#{} has been published", id);
            } else {
                println!("#{} has not been published", id);
                std::process::exit(1);
            }
        }
        HistoryCommand::Record { id } => {
            validate_id(id, config.catalog.size)?;
            let history = open_history(&config.history)
                .await
                .context("Failed to open history")?;
            history
                .record(id)
                .await
                .with_context(|| format!("Failed to record #{}", id))?;
            println!("#{} recorded in {} history", id, history.name());
        }
        HistoryCommand::List { format } => {
            let ids = list_local(&config.history).await?;
            match format.as_str() {
                "json" => println!("{}", serde_json::to_string(&ids)?),
                _ => {
                    for id in ids {
                        println!("{}", id);
                    }
                }
            }
        }
    }

    Ok(())
}

fn validate_id(id: CandidateId, universe: u32) -> Result<()> {
    if id.get() == 0 || id.get() > universe {
        bail!("#{} is outside the catalog [1, {}]", id, universe);
    }
    Ok(())
}

async fn list_local(config: &HistoryConfig) -> Result<Vec<CandidateId>> {
    let HistoryConfig::Local(local) = config else {
        bail!(
            "listing is only supported for the local backend (configured: {})",
            config.backend_name()
        );
    };

    let path = expand_path(&local.path)?;
    let history = LocalHistory::load(&path)
        .await
        .with_context(|| format!("Failed to load {}", path.display()))?;
    Ok(history.published().await)
}
