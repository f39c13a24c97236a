use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{Context, Result};
use football_api::{FootballApiConfig, DEFAULT_BASE_URL};
use scoring_engine::ScoringRules;
use tracing::{info, warn};

use crate::store::DbConfig;

/// Everything the binaries read from the environment (after `dotenv`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db: DbConfig,
    pub log_dir: String,
    pub api_bind: SocketAddr,
    pub football: FootballApiConfig,
    pub poll_interval_secs: u64,
    pub max_matches_per_cycle: usize,
    /// Every Nth cycle re-fetches the whole catalog; 0 disables it.
    pub full_refresh_every: u32,
    pub rules: ScoringRules,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = ScoringRules::default();
        let rules = ScoringRules {
            exact_points: try_load("EXACT_POINTS", defaults.exact_points)?,
            correct_outcome_points: try_load("CORRECT_OUTCOME_POINTS", defaults.correct_outcome_points)?,
            score_live: try_load("SCORE_LIVE_MATCHES", defaults.score_live)?,
        };

        let football = FootballApiConfig {
            base_url: try_load("FOOTBALL_DATA_BASE_URL", DEFAULT_BASE_URL.to_string())?,
            api_key: var("FOOTBALL_DATA_API_KEY").filter(|k| !k.trim().is_empty()),
            competition: try_load("FOOTBALL_COMPETITION", "BSA".to_string())?,
            season: var("FOOTBALL_SEASON")
                .map(|s| s.parse::<u32>().context("Invalid FOOTBALL_SEASON"))
                .transpose()?,
            requests_per_minute: try_load("FOOTBALL_API_REQUESTS_PER_MINUTE", 10)?,
        };

        let api_bind: String = try_load("ANALFABET_API_BIND", "127.0.0.1:3001".to_string())?;

        Ok(Self {
            db: DbConfig {
                path: try_load("ANALFABET_DB_PATH", "data/analfabet.db".to_string())?,
            },
            log_dir: try_load("ANALFABET_LOG_DIR", "logs".to_string())?,
            api_bind: api_bind.parse().context("Invalid ANALFABET_API_BIND")?,
            football,
            poll_interval_secs: try_load("SYNC_POLL_INTERVAL_SECS", 300)?,
            max_matches_per_cycle: try_load("SYNC_MAX_MATCHES_PER_CYCLE", 5)?,
            full_refresh_every: try_load("SYNC_FULL_REFRESH_EVERY", 12)?,
            rules,
        })
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn try_load<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match var(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| {
            warn!("Invalid {key} value {raw:?}: {e}");
            anyhow::anyhow!("Invalid {key} value {raw:?}: {e}")
        }),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
