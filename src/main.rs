use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use podscrape::config::Config;
use podscrape::feed::build_client;
use podscrape::scraper::Scraper;
use podscrape::storage::{catalog, Store};

/// Default config file location (~/.config/podscrape/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("podscrape")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(name = "podscrape", about = "Podcast feed scraper and episode indexer")]
struct Args {
    /// Config file (defaults to ~/.config/podscrape/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape every podcast in the catalog, or a single one
    Scrape {
        /// Only scrape the podcast with this id
        #[arg(long, value_name = "ID")]
        podcast: Option<String>,
    },
    /// List the indexed episodes of a podcast
    Episodes {
        /// Podcast id
        podcast: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let store = Store::open(&config)
        .await
        .with_context(|| format!("Failed to open store in {}", config.data_dir.display()))?;

    match args.command {
        Command::Scrape { podcast } => scrape(store, config, podcast.as_deref()).await,
        Command::Episodes { podcast } => list_episodes(&store, &podcast).await,
    }
}

async fn scrape(store: Store, config: Config, only: Option<&str>) -> Result<()> {
    let mut podcasts = catalog::load_podcasts(&store)
        .await
        .context("Failed to load podcast catalog")?;

    if let Some(id) = only {
        podcasts.retain(|p| p.id == id);
        if podcasts.is_empty() {
            anyhow::bail!("No podcast with id '{}' in the catalog", id);
        }
    }

    if podcasts.is_empty() {
        eprintln!(
            "Warning: the podcast catalog is empty ({}/{})",
            catalog::CONFIG_BUCKET,
            catalog::PODCASTS_KEY
        );
        return Ok(());
    }

    let client = build_client(&config).context("Failed to build HTTP client")?;
    let scraper = Scraper::new(store, client, config);
    let results = scraper.scrape_all_podcasts(&podcasts).await;

    let mut failed = false;
    for result in &results {
        println!("{}: {} new episode(s)", result.podcast_id, result.new_episodes);
        for error in &result.errors {
            println!("  error: {}", error);
            failed = true;
        }
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

async fn list_episodes(store: &Store, podcast_id: &str) -> Result<()> {
    let episodes = catalog::load_episode_index(store, podcast_id)
        .await
        .with_context(|| format!("Failed to load episode index for '{}'", podcast_id))?;

    if episodes.is_empty() {
        println!("No episodes indexed for '{}'", podcast_id);
        return Ok(());
    }

    for episode in &episodes {
        let audio = if episode.is_ready_for_transcription() {
            "audio"
        } else {
            "-"
        };
        println!(
            "{}  {:<11}  {:<5}  {}  {}",
            episode.id,
            episode.status.as_str(),
            audio,
            episode.published,
            episode.title
        );
    }
    Ok(())
}
