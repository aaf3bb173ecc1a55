pub mod api;
pub mod cli;
pub mod core;
pub mod providers;

use crate::core::config::AppConfig;
use crate::core::{FreshnessCache, MetricsProvider, RuleBook};
use crate::providers::caching::CachingMetricsProvider;
use crate::providers::yahoo_finance::YahooFinanceProvider;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

pub enum AppCommand {
    Evaluate { symbols: Vec<String> },
    Rules,
    Portfolio { path: PathBuf },
    Serve { bind: Option<String> },
}

pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");
    Ok(config)
}

/// Yahoo provider behind the freshness cache, as configured.
pub fn build_provider(config: &AppConfig) -> Result<Arc<dyn MetricsProvider>> {
    let yahoo = YahooFinanceProvider::new(config.yahoo_base_url())?;
    let cache = FreshnessCache::with_ttl(config.cache_ttl()?);
    Ok(Arc::new(CachingMetricsProvider::new(yahoo, cache)))
}

pub fn build_state(config: &AppConfig) -> Result<Arc<api::AppState>> {
    let provider = build_provider(config)?;
    let rules = Arc::new(RuleBook::new(config.rule_source()));
    Ok(api::AppState::new(provider, rules))
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("divrole starting...");
    let config = load_config(config_path)?;

    match command {
        AppCommand::Evaluate { symbols } => {
            let state = build_state(&config)?;
            cli::evaluate::run(&symbols, state.provider.as_ref(), &state.rules).await
        }
        AppCommand::Rules => {
            let rules = RuleBook::new(config.rule_source());
            cli::rules::run(&rules).await
        }
        AppCommand::Portfolio { path } => cli::portfolio::run(&path),
        AppCommand::Serve { bind } => {
            let state = build_state(&config)?;
            let bind = bind.unwrap_or_else(|| config.bind_address().to_string());
            api::serve(state, &bind).await
        }
    }
}
