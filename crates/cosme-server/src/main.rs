mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use cosme_core::SystemClock;
use cosme_db::PgStore;
use cosme_pipeline::{Orchestrator, OrchestratorSettings, Stores};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
    scheduler::JobContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(cosme_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = cosme_db::PoolConfig::from_app_config(&config);
    let pool = cosme_db::connect_pool(&config.database_url, pool_config).await?;
    cosme_db::run_migrations(&pool).await?;

    let targets = if config.targets_path.exists() {
        cosme_core::load_targets(&config.targets_path)?.targets
    } else {
        tracing::warn!(
            path = %config.targets_path.display(),
            "targets file not found; scheduled runs disabled"
        );
        Vec::new()
    };

    let store = Arc::new(PgStore::new(pool.clone()));
    let orchestrator = Orchestrator::new(
        Stores::shared(Arc::clone(&store)),
        cosme_clients::build_collaborators(&config)?,
        Arc::new(SystemClock),
        OrchestratorSettings::from_app_config(&config),
    );

    let _scheduler = scheduler::build_scheduler(
        JobContext {
            orchestrator: orchestrator.clone(),
            catalog: store,
            scraper: cosme_clients::build_scraper(&config, None)?,
            targets: Arc::new(targets),
            min_products: config.min_products,
            stale_after: config.stale_run_after(),
        },
        &config.run_cron,
        &config.sweep_cron,
    )
    .await?;

    let auth = AuthState::from_env(matches!(config.env, cosme_core::Environment::Development))?;
    let app = build_app(
        AppState { pool, orchestrator },
        auth,
        default_rate_limit_state(),
    );

    tracing::info!(addr = %config.bind_addr, "listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
