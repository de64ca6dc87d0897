//! Sweep the media host folder for assets no listing references.
//!
//! Dry-run by default: prints a JSON report of the orphan set. Pass
//! `--apply` to also delete the orphans in batches.

use anyhow::{bail, Context, Result};
use clap::Parser;
use listings_service::{connect_pool, sweep, Config, ListingStore, MediaLibrary};
use tracing_subscriber::EnvFilter;

#[derive(clap::Parser, Debug)]
#[command(about = "Report orphaned media assets; delete them with --apply")]
struct Args {
    /// Delete the orphaned assets instead of only reporting them
    #[arg(long)]
    apply: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::load().context("Failed to load configuration")?;

    let Some(media_config) = config.media.clone() else {
        bail!("Media host credentials are not configured; nothing to sweep");
    };

    let pool = connect_pool(&config.database)
        .await
        .context("Failed to connect to database")?;
    let store = ListingStore::new(pool);
    let media = MediaLibrary::new(media_config);

    let report = sweep(
        &store,
        &media,
        &config.delivery_host_suffix(),
        media.folder(),
        args.apply,
    )
    .await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
