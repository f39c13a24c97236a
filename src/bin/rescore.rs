/// Recomputes points for every bet of one round, or of the whole season.
///
/// Run:
///   cargo run --bin rescore -- 12
///   cargo run --bin rescore -- all

use analfabet::config::AppConfig;
use analfabet::store::Store;
use analfabet::sync::log_rescore;
use anyhow::{bail, Context, Result};
use logger::EventLogger;
use tracing::info;

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    analfabet::init_tracing();

    let round = match std::env::args().nth(1).as_deref() {
        None | Some("all") => None,
        Some(raw) => Some(raw.parse::<u32>().with_context(|| format!("invalid round {raw:?}"))?),
    };
    if round == Some(0) {
        bail!("rounds start at 1");
    }

    let cfg = AppConfig::from_env()?;
    let mut store = Store::open(&cfg.db)?;
    let logger = EventLogger::new(&cfg.log_dir);

    let summaries = store.rescore_round(round, &cfg.rules)?;
    let mut bets = 0usize;
    let mut malformed = 0usize;
    for summary in &summaries {
        bets += summary.bets;
        malformed += summary.malformed_bet_ids.len();
        if summary.bets > 0 {
            log_rescore(&logger, summary, "rescore");
        }
    }

    info!(
        round = ?round,
        matches = summaries.len(),
        bets,
        malformed,
        "rescore finished"
    );
    Ok(())
}
