//! Pulls fixtures and results from football-data.org into the store and
//! rescores bets whenever a match changes.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use football_api::{CatalogOutcome, FetchOutcome, FootballApi, UpstreamMatch};
use logger::{
    now_iso, BetsRescoredEvent, EventLogger, MalformedScoreEvent, MatchSyncedEvent, SyncHeartbeatEvent,
};
use scoring_engine::ScoringRules;
use tracing::{info, warn};

use crate::store::{HeartbeatRow, MatchChange, MatchRow, RescoreSummary, SharedStore, Store};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub full_refresh: bool,
    pub matches_checked: usize,
    pub matches_updated: usize,
    pub bets_scored: usize,
    pub rate_limited: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub row: MatchRow,
    pub change: MatchChange,
    pub rescore: Option<RescoreSummary>,
}

pub fn to_row(m: &UpstreamMatch) -> MatchRow {
    MatchRow {
        id: m.id,
        home_team: m.home_team.clone(),
        away_team: m.away_team.clone(),
        match_date: m.match_date,
        home_score: m.home_score,
        away_score: m.away_score,
        status: m.status,
        round: m.round,
        season: m.season.clone(),
    }
}

/// Upserts one upstream match; a changed existing match gets its bets rescored.
pub fn apply_upstream(
    store: &mut Store,
    m: &UpstreamMatch,
    rules: &ScoringRules,
    now: DateTime<Utc>,
) -> Result<Applied> {
    let row = to_row(m);
    let change = store.upsert_match(&row, now)?;
    // Fresh rows cannot have bets yet.
    let rescore = if change.changed && !change.inserted {
        store.rescore_match(m.id, rules)?
    } else {
        None
    };
    Ok(Applied { row, change, rescore })
}

pub fn log_rescore(logger: &EventLogger, summary: &RescoreSummary, trigger: &str) {
    info!(
        match_id = summary.match_id,
        bets = summary.bets,
        exact = summary.exact,
        correct_outcome = summary.correct_outcome,
        trigger,
        "bets rescored"
    );
    let event = BetsRescoredEvent {
        ts: now_iso(),
        event: "BETS_RESCORED",
        match_id: summary.match_id,
        bets: summary.bets,
        exact: summary.exact,
        correct_outcome: summary.correct_outcome,
        malformed: summary.malformed_bet_ids.len(),
        trigger: trigger.to_string(),
    };
    if let Err(e) = logger.log(&event) {
        warn!("Log write failed: {e}");
    }

    for &bet_id in &summary.malformed_bet_ids {
        let event = MalformedScoreEvent {
            ts: now_iso(),
            event: "MALFORMED_SCORE",
            match_id: summary.match_id,
            bet_id: Some(bet_id),
            detail: "score could not be read as an integer, bet scored 0".to_string(),
        };
        if let Err(e) = logger.log(&event) {
            warn!("Log write failed: {e}");
        }
    }
}

fn log_synced(logger: &EventLogger, applied: &Applied) {
    let row = &applied.row;
    info!(
        match_id = row.id,
        round = row.round,
        status = %row.status,
        "{} {:?} x {:?} {} updated",
        row.home_team,
        row.home_score,
        row.away_score,
        row.away_team
    );
    let event = MatchSyncedEvent {
        ts: now_iso(),
        event: "MATCH_SYNCED",
        match_id: row.id,
        round: row.round,
        home: row.home_team.clone(),
        away: row.away_team.clone(),
        home_score: row.home_score,
        away_score: row.away_score,
        status: row.status.to_string(),
        previous_status: applied.change.previous_status.map(|s| s.to_string()),
    };
    if let Err(e) = logger.log(&event) {
        warn!("Log write failed: {e}");
    }
}

pub struct SyncJob {
    api: FootballApi,
    store: SharedStore,
    rules: ScoringRules,
    logger: Arc<EventLogger>,
    max_per_cycle: usize,
    poll_interval_secs: u64,
}

impl SyncJob {
    pub fn new(
        api: FootballApi,
        store: SharedStore,
        rules: ScoringRules,
        logger: Arc<EventLogger>,
        max_per_cycle: usize,
        poll_interval_secs: u64,
    ) -> Self {
        Self {
            api,
            store,
            rules,
            logger,
            max_per_cycle,
            poll_interval_secs,
        }
    }

    /// One sync pass. Fetches the whole catalog when the store is empty or
    /// `full_refresh` is set, otherwise refreshes pending matches one by one.
    /// The heartbeat is written even when the pass fails.
    pub async fn run_cycle(&self, full_refresh: bool) -> Result<CycleReport> {
        let now = Utc::now();
        let mut report = CycleReport::default();
        let outcome = self.refresh(full_refresh, now, &mut report).await;
        self.heartbeat(&report, now).await?;
        outcome.map(|_| report)
    }

    async fn refresh(&self, full_refresh: bool, now: DateTime<Utc>, report: &mut CycleReport) -> Result<()> {
        let catalog_size = self.store.call(|s| s.count_matches()).await?;
        report.full_refresh = full_refresh || catalog_size == 0;

        if report.full_refresh {
            info!("full catalog refresh for {} ({} matches stored)", self.api.competition(), catalog_size);
            match self.api.fetch_matches().await? {
                CatalogOutcome::Fetched(fetched) => {
                    report.matches_checked = fetched.len();
                    self.apply(fetched, now, report).await?;
                }
                CatalogOutcome::RateLimited => report.rate_limited = true,
            }
            return Ok(());
        }

        let max = self.max_per_cycle;
        let pending = self.store.call(move |s| s.pending_matches(max, now)).await?;
        if pending.is_empty() {
            info!("no pending matches to refresh");
        }
        for m in pending {
            report.matches_checked += 1;
            match self.api.fetch_match(m.id).await {
                Ok(FetchOutcome::Found(up)) => self.apply(vec![up], now, report).await?,
                Ok(FetchOutcome::NotFound) => self.cancel(m.id, now, report).await?,
                Ok(FetchOutcome::RateLimited) => {
                    report.rate_limited = true;
                    break;
                }
                Err(e) => warn!("refresh of match {} failed: {e:#}", m.id),
            }
        }
        Ok(())
    }

    async fn apply(&self, fetched: Vec<UpstreamMatch>, now: DateTime<Utc>, report: &mut CycleReport) -> Result<()> {
        let rules = self.rules;
        let logger = Arc::clone(&self.logger);
        let (updated, scored) = self
            .store
            .call(move |s| {
                let mut updated = 0usize;
                let mut scored = 0usize;
                for m in &fetched {
                    let applied = apply_upstream(s, m, &rules, now)?;
                    if !applied.change.changed {
                        continue;
                    }
                    updated += 1;
                    log_synced(&logger, &applied);
                    if let Some(summary) = &applied.rescore {
                        scored += summary.bets;
                        log_rescore(&logger, summary, "sync");
                    }
                }
                Ok((updated, scored))
            })
            .await?;
        report.matches_updated += updated;
        report.bets_scored += scored;
        Ok(())
    }

    async fn cancel(&self, match_id: i64, now: DateTime<Utc>, report: &mut CycleReport) -> Result<()> {
        let rules = self.rules;
        let logger = Arc::clone(&self.logger);
        let scored = self
            .store
            .call(move |s| {
                if !s.mark_cancelled(match_id, now)? {
                    return Ok(None);
                }
                warn!(match_id, "match vanished upstream, marked cancelled");
                let summary = s.rescore_match(match_id, &rules)?;
                if let Some(summary) = &summary {
                    log_rescore(&logger, summary, "sync");
                }
                Ok(Some(summary.map_or(0, |s| s.bets)))
            })
            .await?;
        if let Some(bets) = scored {
            report.matches_updated += 1;
            report.bets_scored += bets;
        }
        Ok(())
    }

    async fn heartbeat(&self, report: &CycleReport, now: DateTime<Utc>) -> Result<()> {
        let row = HeartbeatRow {
            ts: now,
            matches_checked: report.matches_checked as i64,
            matches_updated: report.matches_updated as i64,
            bets_scored: report.bets_scored as i64,
            rate_limited: report.rate_limited,
        };
        self.store.call(move |s| s.record_heartbeat(&row)).await?;

        let event = SyncHeartbeatEvent {
            ts: now_iso(),
            event: "SYNC_HEARTBEAT",
            poll_interval_secs: self.poll_interval_secs,
            matches_checked: report.matches_checked,
            matches_updated: report.matches_updated,
            bets_scored: report.bets_scored,
            rate_limited: report.rate_limited,
        };
        if let Err(e) = self.logger.log(&event) {
            warn!("Log write failed: {e}");
        }
        Ok(())
    }
}
