use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so tests can drive it with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    // Empty strings count as unset for optional credentials and endpoints.
    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("COSME_ENV", "development"))?;

    let bind_addr = parse_addr("COSME_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("COSME_LOG_LEVEL", "info");
    let targets_path = PathBuf::from(or_default("COSME_TARGETS_PATH", "./config/targets.yaml"));

    let db_max_connections = parse_u32("COSME_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("COSME_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("COSME_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let cooldown_hours = parse_u32("COSME_COOLDOWN_HOURS", "720")?;
    let summary_freshness_hours = parse_u32("COSME_SUMMARY_FRESHNESS_HOURS", "720")?;
    let stale_run_minutes = parse_u32("COSME_STALE_RUN_MINUTES", "120")?;
    if stale_run_minutes == 0 {
        return Err(invalid(
            "COSME_STALE_RUN_MINUTES",
            "must be greater than zero".to_string(),
        ));
    }
    let min_products = parse_usize("COSME_MIN_PRODUCTS", "7")?;

    let http_timeout_secs = parse_u64("COSME_HTTP_TIMEOUT_SECS", "30")?;
    let user_agent = or_default("COSME_USER_AGENT", "cosme-shorts/0.1 (ranking-video)");
    let ranking_feed_url = optional("COSME_RANKING_FEED_URL");

    let openai_api_key = optional("OPENAI_API_KEY");
    let openai_base_url = or_default("COSME_OPENAI_BASE_URL", "https://api.openai.com/v1");
    let openai_model = or_default("COSME_OPENAI_MODEL", "gpt-4o");
    let summarizer_max_retries = parse_u32("COSME_SUMMARIZER_MAX_RETRIES", "3")?;

    let render_command = optional("COSME_RENDER_COMMAND");
    let render_timeout_secs = parse_u64("COSME_RENDER_TIMEOUT_SECS", "600")?;
    if render_timeout_secs == 0 {
        return Err(invalid(
            "COSME_RENDER_TIMEOUT_SECS",
            "must be greater than zero".to_string(),
        ));
    }
    let storage_bucket = optional("COSME_STORAGE_BUCKET");
    let gcs_credentials_path = optional("GOOGLE_APPLICATION_CREDENTIALS").map(PathBuf::from);
    let notify_webhook_url = optional("COSME_NOTIFY_WEBHOOK_URL");

    let run_cron = or_default("COSME_RUN_CRON", "0 0 9 * * *");
    let sweep_cron = or_default("COSME_SWEEP_CRON", "0 */15 * * * *");

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        targets_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        cooldown_hours,
        summary_freshness_hours,
        stale_run_minutes,
        min_products,
        http_timeout_secs,
        user_agent,
        ranking_feed_url,
        openai_api_key,
        openai_base_url,
        openai_model,
        summarizer_max_retries,
        render_command,
        render_timeout_secs,
        storage_bucket,
        gcs_credentials_path,
        notify_webhook_url,
        run_cron,
        sweep_cron,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "COSME_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
