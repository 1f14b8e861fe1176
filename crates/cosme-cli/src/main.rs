mod catalog;
mod runs;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use cosme_core::{AppConfig, RunTarget, SystemClock};
use cosme_db::PgStore;
use cosme_pipeline::{Orchestrator, OrchestratorSettings, Stores};
use tracing_subscriber::EnvFilter;

use crate::catalog::CatalogCommands;
use crate::runs::RunsCommands;

#[derive(Debug, Parser)]
#[command(name = "cosme-cli")]
#[command(about = "Ranking promo-video run engine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Fetch a ranking and merge it into the catalog
    Ingest {
        #[arg(long)]
        genre: String,
        #[arg(long)]
        channel: String,
        /// Read the ranking from a local JSON file instead of the feed
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Execute one run for a (genre, channel) pair
    Run {
        #[arg(long)]
        genre: String,
        #[arg(long)]
        channel: String,
        /// Select and summarize only; no ledger entry, render or upload
        #[arg(long)]
        dry_run: bool,
    },
    /// Inspect and maintain the run ledger
    Runs {
        #[command(subcommand)]
        command: RunsCommands,
    },
    /// Inspect the product catalog
    Catalog {
        #[command(subcommand)]
        command: CatalogCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    Ping,
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("cosme-cli ready; see --help for commands");
        return Ok(());
    };

    let config = cosme_core::load_app_config_from_env()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = cosme_db::PoolConfig::from_app_config(&config);
    let pool = cosme_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db { command } => match command {
            DbCommands::Ping => {
                cosme_db::health_check(&pool).await?;
                println!("database ok");
            }
            DbCommands::Migrate => {
                let applied = cosme_db::run_migrations(&pool).await?;
                println!("applied {applied} migration(s)");
            }
        },
        Commands::Ingest {
            genre,
            channel,
            file,
        } => {
            let target = RunTarget::new(genre.trim(), channel.trim());
            catalog::run_ingest(&pool, &config, &target, file).await?;
        }
        Commands::Run {
            genre,
            channel,
            dry_run,
        } => {
            let target = RunTarget::new(genre.trim(), channel.trim());
            let orchestrator = build_orchestrator(pool, &config)?;
            if dry_run {
                runs::run_preview(&orchestrator, &target).await?;
            } else {
                runs::run_once(&orchestrator, &target).await?;
            }
        }
        Commands::Runs { command } => match command {
            RunsCommands::List { limit, status } => {
                runs::run_list(&pool, limit, status.as_deref()).await?;
            }
            RunsCommands::Show { run_id } => runs::run_show(&pool, run_id).await?,
            RunsCommands::Sweep {
                older_than_minutes,
            } => {
                let orchestrator = build_orchestrator(pool, &config)?;
                let minutes = older_than_minutes.unwrap_or(config.stale_run_minutes);
                runs::run_sweep(&orchestrator, minutes).await?;
            }
        },
        Commands::Catalog { command } => match command {
            CatalogCommands::List {
                genre,
                channel,
                limit,
            } => {
                catalog::run_catalog_list(&pool, genre.as_deref(), channel.as_deref(), limit)
                    .await?;
            }
        },
    }

    Ok(())
}

fn build_orchestrator(pool: sqlx::PgPool, config: &AppConfig) -> anyhow::Result<Orchestrator> {
    let collaborators = cosme_clients::build_collaborators(config)?;
    Ok(Orchestrator::new(
        Stores::shared(Arc::new(PgStore::new(pool))),
        collaborators,
        Arc::new(SystemClock),
        OrchestratorSettings::from_app_config(config),
    ))
}
