//! poke-post - Publish today's Pokemon to Bluesky

use clap::Parser;
use libpokecast::logging::LoggingConfig;
use libpokecast::{Config, PublishOutcome, Publisher, Result};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "poke-post")]
#[command(version)]
#[command(about = "Publish a not-yet-featured Pokemon of the day to Bluesky")]
#[command(long_about = "\
poke-post - Publish a not-yet-featured Pokemon of the day to Bluesky

DESCRIPTION:
    Picks a random species that is not in the publish history, builds a
    post from PokeAPI data (types, flavor text, base stats, official
    artwork), publishes it, and records the id so it is never repeated.

    Exactly one post is made per run. If the post succeeds but the history
    write fails, the run still succeeds and the failure is logged; that id
    may be published again later.

USAGE:
    # Publish using ~/.config/pokecast/config.toml
    poke-post

    # Use another config file
    poke-post --config ./pokecast.toml

    # Machine-readable result
    poke-post --format json

CONFIGURATION:
    Configuration file: ~/.config/pokecast/config.toml (or POKECAST_CONFIG)
    Credentials: POKECAST_BSKY_HANDLE, POKECAST_BSKY_PASSWORD
    A .env file in the working directory is loaded first.

EXIT CODES:
    0 - Published
    1 - Publish failed (data fetch, composition, or posting)
    2 - Bluesky authentication failed
    3 - Configuration error
    4 - Every id in the catalog has already been published
")]
struct Cli {
    /// Path to the config file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    // A missing .env is normal
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    LoggingConfig::from_env(cli.verbose).init();

    match run(&cli).await {
        Ok(outcome) => {
            info!(id = %outcome.id, uri = %outcome.uri, "{}", outcome);
            print_outcome(&outcome, &cli.format);
        }
        Err(e) => {
            error!(error = %e, "Run failed");
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: &Cli) -> Result<PublishOutcome> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load_or_default()?,
    };
    config.apply_env_overrides();

    let mut publisher = Publisher::from_config(config).await?;
    publisher.publish().await
}

fn print_outcome(outcome: &PublishOutcome, format: &str) {
    match format {
        "json" => {
            let json = serde_json::json!({
                "id": outcome.id,
                "uri": outcome.uri,
                "cid": outcome.cid,
                "history_recorded": outcome.history_recorded,
            });
            println!("{}", json);
        }
        _ => println!("{}", outcome),
    }
}
