/// AnalfaBet — Sync worker
///
/// What it does:
///   1. Populates the match catalog from football-data.org on first run
///   2. Every poll refreshes the oldest kicked-off matches that are not final
///   3. Rescores every bet on a match whose result changed
///   4. Re-fetches the whole catalog every SYNC_FULL_REFRESH_EVERY cycles
///
/// Run:
///   cargo run --bin analfabet-sync [-- --full]

use analfabet::config::AppConfig;
use analfabet::store::{SharedStore, Store};
use analfabet::sync::SyncJob;
use anyhow::Result;
use dotenv::dotenv;
use football_api::FootballApi;
use logger::EventLogger;
use std::env;
use std::fs::File;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    analfabet::init_tracing();

    let cfg = AppConfig::from_env()?;
    let force_full = env::args().any(|a| a == "--full");

    info!("=== AnalfaBet sync — {} ===", cfg.football.competition);
    info!("DB: {} | logs: {}/", cfg.db.path, cfg.log_dir);
    info!(
        "Scoring: exact={} outcome={} score_live={}",
        cfg.rules.exact_points, cfg.rules.correct_outcome_points, cfg.rules.score_live
    );

    // Single instance lock
    let lock_file_path = env::temp_dir().join("analfabet_sync.lock");
    let lock_file = match File::create(&lock_file_path) {
        Ok(f) => f,
        Err(e) => {
            warn!("Failed to create lock file at {:?}: {}", lock_file_path, e);
            return Ok(());
        }
    };

    let mut lock = fd_lock::RwLock::new(lock_file);
    let _write_guard = match lock.try_write() {
        Ok(guard) => {
            info!("Acquired single-instance lock.");
            guard
        }
        Err(_) => {
            warn!("Another instance of analfabet-sync is already running! Exiting.");
            return Ok(());
        }
    };

    let store = SharedStore::new(Store::open(&cfg.db)?);
    let logger = Arc::new(EventLogger::new(&cfg.log_dir));
    let api = FootballApi::new(cfg.football.clone(), &cfg.log_dir)?;
    let job = SyncJob::new(
        api,
        store,
        cfg.rules,
        logger,
        cfg.max_matches_per_cycle,
        cfg.poll_interval_secs,
    );

    info!("Poll interval: {}s, max {} matches per cycle", cfg.poll_interval_secs, cfg.max_matches_per_cycle);

    let mut cycle: u32 = 0;
    loop {
        let full_refresh = (cycle == 0 && force_full)
            || (cfg.full_refresh_every > 0 && cycle > 0 && cycle % cfg.full_refresh_every == 0);
        info!("--- Sync cycle {} ---", cycle);

        match job.run_cycle(full_refresh).await {
            Ok(report) => info!(
                "cycle done: checked={} updated={} bets_scored={} rate_limited={}",
                report.matches_checked, report.matches_updated, report.bets_scored, report.rate_limited
            ),
            Err(e) => error!("sync cycle failed: {e:#}"),
        }

        cycle = cycle.wrapping_add(1);
        sleep(Duration::from_secs(cfg.poll_interval_secs)).await;
    }
}
