/// AnalfaBet — Logger
/// JSONL event stream, one file per UTC day

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct EventLogger {
    log_dir: PathBuf,
}

impl EventLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let dir = log_dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::warn!("cannot create log dir {:?}: {}", dir, e);
        }
        Self { log_dir: dir }
    }

    pub fn dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn log<T: Serialize>(&self, event: &T) -> Result<()> {
        let date  = Utc::now().format("%Y-%m-%d").to_string();
        let path  = self.log_dir.join(format!("{date}.jsonl"));
        let line  = serde_json::to_string(event).context("serialize event")?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        writeln!(f, "{line}")?;
        Ok(())
    }
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

// ── Event types ──────────────────────────────────────────────────────────────

/// A match row was inserted or changed by the sync job.
#[derive(Serialize, Debug)]
pub struct MatchSyncedEvent {
    pub ts:          String,
    pub event:       &'static str,   // "MATCH_SYNCED"
    pub match_id:    i64,
    pub round:       u32,
    pub home:        String,
    pub away:        String,
    pub home_score:  Option<i64>,
    pub away_score:  Option<i64>,
    pub status:      String,
    pub previous_status: Option<String>,
}

/// Every bet on one match was (re)scored.
#[derive(Serialize, Debug)]
pub struct BetsRescoredEvent {
    pub ts:          String,
    pub event:       &'static str,   // "BETS_RESCORED"
    pub match_id:    i64,
    pub bets:        usize,
    pub exact:       usize,
    pub correct_outcome: usize,
    pub malformed:   usize,
    pub trigger:     String,         // "sync" | "manual" | "rescore"
}

/// Score data that could not be coerced to integers.
#[derive(Serialize, Debug)]
pub struct MalformedScoreEvent {
    pub ts:          String,
    pub event:       &'static str,   // "MALFORMED_SCORE"
    pub match_id:    i64,
    pub bet_id:      Option<i64>,
    pub detail:      String,
}

#[derive(Serialize, Debug)]
pub struct ApiStatusEvent {
    pub ts:           String,
    pub event:        &'static str,  // "API_STATUS"
    pub source:       String,
    pub scope:        String,
    pub ok:           bool,
    pub status_code:  Option<u16>,
    pub message:      String,
    pub items_logged: usize,
}

#[derive(Serialize, Debug)]
pub struct SyncHeartbeatEvent {
    pub ts:                 String,
    pub event:              &'static str,  // "SYNC_HEARTBEAT"
    pub poll_interval_secs: u64,
    pub matches_checked:    usize,
    pub matches_updated:    usize,
    pub bets_scored:        usize,
    pub rate_limited:       bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_json_line_per_event() {
        let dir = std::env::temp_dir().join(format!("analfabet-logger-{}", std::process::id()));
        let logger = EventLogger::new(&dir);

        for bets in [2, 5] {
            logger
                .log(&BetsRescoredEvent {
                    ts: now_iso(),
                    event: "BETS_RESCORED",
                    match_id: 42,
                    bets,
                    exact: 1,
                    correct_outcome: 0,
                    malformed: 0,
                    trigger: "manual".to_string(),
                })
                .unwrap();
        }

        let file = dir.join(format!("{}.jsonl", Utc::now().format("%Y-%m-%d")));
        let raw = fs::read_to_string(&file).unwrap();
        let lines: Vec<serde_json::Value> = raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "BETS_RESCORED");
        assert_eq!(lines[1]["bets"], 5);

        fs::remove_dir_all(&dir).ok();
    }
}
