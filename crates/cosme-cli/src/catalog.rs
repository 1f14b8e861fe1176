//! Catalog command handlers.

use std::path::PathBuf;

use clap::Subcommand;
use cosme_core::{AppConfig, Product, RunTarget};
use cosme_db::PgStore;

#[derive(Debug, Subcommand)]
pub enum CatalogCommands {
    /// List catalog products in rank order
    List {
        #[arg(long)]
        genre: Option<String>,
        #[arg(long)]
        channel: Option<String>,
        #[arg(long, default_value = "50")]
        limit: u32,
    },
}

/// Fetches the ranking for `target` and upserts it.
///
/// # Errors
///
/// Returns an error if no ranking source is configured, or if the fetch or
/// the upsert fails.
pub(crate) async fn run_ingest(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    target: &RunTarget,
    file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let scraper = cosme_clients::build_scraper(config, file)?.ok_or_else(|| {
        anyhow::anyhow!("no ranking source: set COSME_RANKING_FEED_URL or pass --file")
    })?;

    let store = PgStore::new(pool.clone());
    let report =
        cosme_pipeline::ingest_ranking(scraper.as_ref(), &store, target, config.min_products)
            .await?;

    println!(
        "ingested {} products for {target}: {} new, {} updated",
        report.fetched, report.upserted.inserted, report.upserted.updated
    );
    if report.below_minimum {
        eprintln!(
            "warning: ranking returned fewer than {} products",
            config.min_products
        );
    }
    Ok(())
}

pub(crate) async fn run_catalog_list(
    pool: &sqlx::PgPool,
    genre: Option<&str>,
    channel: Option<&str>,
    limit: u32,
) -> anyhow::Result<()> {
    let rows = cosme_db::list_products(pool, genre, channel, i64::from(limit)).await?;
    if rows.is_empty() {
        println!("catalog is empty; run `ingest` first");
        return Ok(());
    }

    println!(
        "{:<6}{:<14}{:<22}{:<12}NAME",
        "RANK", "ID", "TARGET", "LAST USED"
    );
    for product in rows.into_iter().map(Product::from) {
        let last_used = product
            .last_used
            .map_or_else(|| "\u{2014}".to_string(), |t| t.format("%Y-%m-%d").to_string());
        let name = if product.name.chars().count() > 40 {
            format!("{}...", product.name.chars().take(40).collect::<String>())
        } else {
            product.name.clone()
        };
        println!(
            "{:<6}{:<14}{:<22}{:<12}{} {}",
            product.scraped_rank,
            product.product_id,
            format!("{}/{}", product.genre, product.channel),
            last_used,
            product.brand,
            name
        );
    }
    Ok(())
}
