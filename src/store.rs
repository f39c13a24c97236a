use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use round_selector::MatchSummary;
use rusqlite::types::{Type, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use scoring_engine::{score_raw, MatchStatus, RawMatchResult, RawPrediction, RawScore, ScoringRules, Verdict};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub path: String,
}

// ── Rows ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchRow {
    pub id: i64,
    pub home_team: String,
    pub away_team: String,
    pub match_date: DateTime<Utc>,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub status: MatchStatus,
    pub round: u32,
    pub season: String,
}

impl MatchRow {
    pub fn summary(&self) -> MatchSummary {
        MatchSummary {
            round: self.round,
            match_date: self.match_date,
            status: self.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BetRow {
    pub id: i64,
    pub user_id: i64,
    pub match_id: i64,
    /// `None` when the stored value is not numeric.
    pub home_score_bet: Option<i64>,
    pub away_score_bet: Option<i64>,
    pub points: u32,
    pub is_exact: bool,
    pub verdict: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A bet together with its owner and fixture, for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BetView {
    #[serde(flatten)]
    pub bet: BetRow,
    pub user_name: String,
    #[serde(rename = "match")]
    pub fixture: MatchRow,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingRow {
    pub user_id: i64,
    pub name: String,
    pub total_points: i64,
    pub exact_scores: i64,
    pub total_bets: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserCreation {
    Created(UserRow),
    EmailTaken,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BetPlacement {
    Saved(BetRow),
    UserNotFound,
    MatchNotFound,
    /// Only scheduled matches take bets.
    BettingClosed(MatchStatus),
    KickoffPassed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchChange {
    pub inserted: bool,
    pub changed: bool,
    pub previous_status: Option<MatchStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RescoreSummary {
    pub match_id: i64,
    pub bets: usize,
    pub exact: usize,
    pub correct_outcome: usize,
    pub total_points: u64,
    pub malformed_bet_ids: Vec<i64>,
}

impl RescoreSummary {
    fn record(&mut self, bet_id: i64, verdict: Verdict, points: u32) {
        self.bets += 1;
        self.total_points += u64::from(points);
        match verdict {
            Verdict::Exact => self.exact += 1,
            Verdict::CorrectOutcome => self.correct_outcome += 1,
            Verdict::Malformed => self.malformed_bet_ids.push(bet_id),
            Verdict::Miss | Verdict::NotScorable => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatRow {
    pub ts: DateTime<Utc>,
    pub matches_checked: i64,
    pub matches_updated: i64,
    pub bets_scored: i64,
    pub rate_limited: bool,
}

/// Highest points; ties broken by exact scores. Empty when nobody scored.
pub fn winners(ranking: &[RankingRow]) -> Vec<RankingRow> {
    let Some(top) = ranking.iter().map(|r| r.total_points).max() else {
        return Vec::new();
    };
    if top <= 0 {
        return Vec::new();
    }
    let leaders: Vec<&RankingRow> = ranking.iter().filter(|r| r.total_points == top).collect();
    let best_exact = leaders.iter().map(|r| r.exact_scores).max().unwrap_or(0);
    leaders
        .into_iter()
        .filter(|r| r.exact_scores == best_exact)
        .cloned()
        .collect()
}

pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ── Column helpers ───────────────────────────────────────────────────────────

fn raw_score(row: &Row, idx: usize) -> rusqlite::Result<RawScore> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null | ValueRef::Blob(_) => RawScore::Missing,
        ValueRef::Integer(i) => RawScore::Int(i),
        ValueRef::Real(f) => RawScore::Float(f),
        ValueRef::Text(t) => RawScore::Text(String::from_utf8_lossy(t).into_owned()),
    })
}

fn status_col(row: &Row, idx: usize) -> rusqlite::Result<MatchStatus> {
    let raw: String = row.get(idx)?;
    Ok(raw.parse().unwrap_or_else(|e| {
        warn!("{e}, treating as scheduled");
        MatchStatus::Scheduled
    }))
}

fn ts_col(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

const MATCH_COLS: &str =
    "m.id, m.home_team, m.away_team, m.match_date, m.home_score, m.away_score, m.status, m.round, m.season";

fn match_from_row(row: &Row, base: usize) -> rusqlite::Result<MatchRow> {
    Ok(MatchRow {
        id: row.get(base)?,
        home_team: row.get(base + 1)?,
        away_team: row.get(base + 2)?,
        match_date: ts_col(row, base + 3)?,
        home_score: raw_score(row, base + 4)?.coerce(),
        away_score: raw_score(row, base + 5)?.coerce(),
        status: status_col(row, base + 6)?,
        round: row.get(base + 7)?,
        season: row.get(base + 8)?,
    })
}

const BET_COLS: &str = "b.id, b.user_id, b.match_id, b.home_score_bet, b.away_score_bet, \
     b.points, b.is_exact, b.verdict, b.created_at, b.updated_at";

fn bet_from_row(row: &Row, base: usize) -> rusqlite::Result<BetRow> {
    Ok(BetRow {
        id: row.get(base)?,
        user_id: row.get(base + 1)?,
        match_id: row.get(base + 2)?,
        home_score_bet: raw_score(row, base + 3)?.coerce(),
        away_score_bet: raw_score(row, base + 4)?.coerce(),
        points: row.get(base + 5)?,
        is_exact: row.get(base + 6)?,
        verdict: row.get(base + 7)?,
        created_at: row.get(base + 8)?,
        updated_at: row.get(base + 9)?,
    })
}

fn bet_view_from_row(row: &Row) -> rusqlite::Result<BetView> {
    Ok(BetView {
        bet: bet_from_row(row, 0)?,
        user_name: row.get(10)?,
        fixture: match_from_row(row, 11)?,
    })
}

// ── Store ────────────────────────────────────────────────────────────────────

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(cfg: &DbConfig) -> Result<Self> {
        let db_path = Path::new(&cfg.path);
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("open sqlite db at {}", cfg.path))?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();

        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;").context("enable foreign keys")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    // ── users ────────────────────────────────────────────────────────────────

    pub fn create_user(&mut self, name: &str, email: &str, now: DateTime<Utc>) -> Result<UserCreation> {
        let taken: Option<i64> = self
            .conn
            .query_row("SELECT id FROM users WHERE email = ?1", params![email], |r| r.get(0))
            .optional()
            .context("look up email")?;
        if taken.is_some() {
            return Ok(UserCreation::EmailTaken);
        }

        let created_at = fmt_ts(now);
        self.conn
            .execute(
                "INSERT INTO users(name, email, created_at) VALUES (?1, ?2, ?3)",
                params![name, email, created_at],
            )
            .context("insert user")?;

        Ok(UserCreation::Created(UserRow {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            email: email.to_string(),
            created_at,
        }))
    }

    pub fn user(&self, id: i64) -> Result<Option<UserRow>> {
        self.conn
            .query_row(
                "SELECT id, name, email, created_at FROM users WHERE id = ?1",
                params![id],
                |r| {
                    Ok(UserRow {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        email: r.get(2)?,
                        created_at: r.get(3)?,
                    })
                },
            )
            .optional()
            .context("read user")
    }

    // ── matches ──────────────────────────────────────────────────────────────

    pub fn match_by_id(&self, id: i64) -> Result<Option<MatchRow>> {
        self.conn
            .query_row(
                &format!("SELECT {MATCH_COLS} FROM matches m WHERE m.id = ?1"),
                params![id],
                |r| match_from_row(r, 0),
            )
            .optional()
            .with_context(|| format!("read match {id}"))
    }

    /// Matches ordered by kickoff, optionally restricted to one round.
    pub fn matches(&self, round: Option<u32>) -> Result<Vec<MatchRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MATCH_COLS} FROM matches m
             WHERE (?1 IS NULL OR m.round = ?1)
             ORDER BY m.match_date ASC, m.id ASC"
        ))?;
        let rows = stmt
            .query_map(params![round], |r| match_from_row(r, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("read matches")?;
        Ok(rows)
    }

    pub fn match_summaries(&self) -> Result<Vec<MatchSummary>> {
        Ok(self.matches(None)?.iter().map(MatchRow::summary).collect())
    }

    pub fn count_matches(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(1) FROM matches", [], |r| r.get(0))
            .context("count matches")
    }

    /// Kicked-off matches whose result is still open upstream, oldest first.
    pub fn pending_matches(&self, limit: usize, started_before: DateTime<Utc>) -> Result<Vec<MatchRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MATCH_COLS} FROM matches m
             WHERE m.status IN ('scheduled', 'live') AND m.match_date <= ?1
             ORDER BY m.match_date ASC, m.id ASC
             LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![fmt_ts(started_before), limit as i64], |r| match_from_row(r, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("read pending matches")?;
        Ok(rows)
    }

    pub fn upsert_match(&mut self, m: &MatchRow, now: DateTime<Utc>) -> Result<MatchChange> {
        let previous = self.match_by_id(m.id)?;
        let change = MatchChange {
            inserted: previous.is_none(),
            changed: previous.as_ref() != Some(m),
            previous_status: previous.as_ref().map(|p| p.status),
        };
        if !change.changed {
            return Ok(change);
        }

        self.conn
            .execute(
                r#"
                INSERT INTO matches(id, home_team, away_team, match_date, home_score, away_score, status, round, season, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(id) DO UPDATE SET
                    home_team=excluded.home_team,
                    away_team=excluded.away_team,
                    match_date=excluded.match_date,
                    home_score=excluded.home_score,
                    away_score=excluded.away_score,
                    status=excluded.status,
                    round=excluded.round,
                    season=excluded.season,
                    updated_at=excluded.updated_at
                "#,
                params![
                    m.id,
                    m.home_team,
                    m.away_team,
                    fmt_ts(m.match_date),
                    m.home_score,
                    m.away_score,
                    m.status.as_str(),
                    m.round,
                    m.season,
                    fmt_ts(now),
                ],
            )
            .with_context(|| format!("upsert match {}", m.id))?;

        Ok(change)
    }

    /// Manual result correction. `None` when the match does not exist.
    pub fn update_match_result(
        &mut self,
        id: i64,
        home_score: i64,
        away_score: i64,
        status: MatchStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<MatchRow>> {
        let updated = self
            .conn
            .execute(
                "UPDATE matches SET home_score = ?1, away_score = ?2, status = ?3, updated_at = ?4 WHERE id = ?5",
                params![home_score, away_score, status.as_str(), fmt_ts(now), id],
            )
            .with_context(|| format!("update result of match {id}"))?;
        if updated == 0 {
            return Ok(None);
        }
        self.match_by_id(id)
    }

    pub fn mark_cancelled(&mut self, id: i64, now: DateTime<Utc>) -> Result<bool> {
        let updated = self
            .conn
            .execute(
                "UPDATE matches SET status = 'cancelled', updated_at = ?1 WHERE id = ?2 AND status != 'cancelled'",
                params![fmt_ts(now), id],
            )
            .with_context(|| format!("cancel match {id}"))?;
        Ok(updated > 0)
    }

    // ── bets ─────────────────────────────────────────────────────────────────

    /// Insert or overwrite a user's prediction (last write wins).
    pub fn place_bet(
        &mut self,
        user_id: i64,
        match_id: i64,
        home_score: i64,
        away_score: i64,
        now: DateTime<Utc>,
    ) -> Result<BetPlacement> {
        if self.user(user_id)?.is_none() {
            return Ok(BetPlacement::UserNotFound);
        }
        let Some(fixture) = self.match_by_id(match_id)? else {
            return Ok(BetPlacement::MatchNotFound);
        };
        if fixture.status != MatchStatus::Scheduled {
            return Ok(BetPlacement::BettingClosed(fixture.status));
        }
        if fixture.match_date <= now {
            return Ok(BetPlacement::KickoffPassed);
        }

        self.conn
            .execute(
                r#"
                INSERT INTO bets(user_id, match_id, home_score_bet, away_score_bet, points, is_exact, verdict, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, 0, 0, ?5, ?6, ?6)
                ON CONFLICT(user_id, match_id) DO UPDATE SET
                    home_score_bet=excluded.home_score_bet,
                    away_score_bet=excluded.away_score_bet,
                    updated_at=excluded.updated_at
                "#,
                params![
                    user_id,
                    match_id,
                    home_score,
                    away_score,
                    Verdict::NotScorable.as_str(),
                    fmt_ts(now),
                ],
            )
            .context("upsert bet")?;

        let bet = self
            .conn
            .query_row(
                &format!("SELECT {BET_COLS} FROM bets b WHERE b.user_id = ?1 AND b.match_id = ?2"),
                params![user_id, match_id],
                |r| bet_from_row(r, 0),
            )
            .context("read bet back")?;
        Ok(BetPlacement::Saved(bet))
    }

    pub fn bets_for_user(&self, user_id: i64) -> Result<Vec<BetView>> {
        self.bet_views("b.user_id = ?1", params![user_id])
    }

    /// Everyone's bets, optionally for one round.
    pub fn league_bets(&self, round: Option<u32>) -> Result<Vec<BetView>> {
        self.bet_views("(?1 IS NULL OR m.round = ?1)", params![round])
    }

    fn bet_views(&self, filter: &str, args: impl rusqlite::Params) -> Result<Vec<BetView>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {BET_COLS}, u.name, {MATCH_COLS}
             FROM bets b
             JOIN users u ON u.id = b.user_id
             JOIN matches m ON m.id = b.match_id
             WHERE {filter}
             ORDER BY m.match_date ASC, m.id ASC, u.name ASC"
        ))?;
        let rows = stmt
            .query_map(args, bet_view_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("read bets")?;
        Ok(rows)
    }

    /// Recomputes every bet on one match. Overwrites, never accumulates.
    pub fn rescore_match(&mut self, match_id: i64, rules: &ScoringRules) -> Result<Option<RescoreSummary>> {
        let tx = self.conn.transaction().context("begin rescore")?;

        let result = tx
            .query_row(
                "SELECT home_score, away_score, status FROM matches WHERE id = ?1",
                params![match_id],
                |r| {
                    Ok(RawMatchResult {
                        home_score: raw_score(r, 0)?,
                        away_score: raw_score(r, 1)?,
                        status: status_col(r, 2)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("read result of match {match_id}"))?;
        let Some(result) = result else {
            return Ok(None);
        };

        let bets: Vec<(i64, RawPrediction)> = {
            let mut stmt = tx.prepare("SELECT id, home_score_bet, away_score_bet FROM bets WHERE match_id = ?1")?;
            let rows = stmt
                .query_map(params![match_id], |r| {
                    Ok((
                        r.get(0)?,
                        RawPrediction {
                            home_score: raw_score(r, 1)?,
                            away_score: raw_score(r, 2)?,
                        },
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let mut summary = RescoreSummary {
            match_id,
            ..RescoreSummary::default()
        };
        {
            let mut update = tx.prepare("UPDATE bets SET points = ?1, is_exact = ?2, verdict = ?3 WHERE id = ?4")?;
            for (bet_id, prediction) in &bets {
                let outcome = score_raw(prediction, &result, rules);
                update.execute(params![outcome.points, outcome.is_exact, outcome.verdict.as_str(), bet_id])?;
                summary.record(*bet_id, outcome.verdict, outcome.points);
            }
        }

        tx.commit().context("commit rescore")?;
        Ok(Some(summary))
    }

    pub fn rescore_round(&mut self, round: Option<u32>, rules: &ScoringRules) -> Result<Vec<RescoreSummary>> {
        let ids: Vec<i64> = self.matches(round)?.into_iter().map(|m| m.id).collect();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(summary) = self.rescore_match(id, rules)? {
                out.push(summary);
            }
        }
        Ok(out)
    }

    // ── ranking ──────────────────────────────────────────────────────────────

    pub fn ranking(&self, round: Option<u32>) -> Result<Vec<RankingRow>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT u.id, u.name,
                   COALESCE(SUM(b.points), 0) AS total_points,
                   COALESCE(SUM(CASE WHEN b.is_exact THEN 1 ELSE 0 END), 0) AS exact_scores,
                   COUNT(b.id) AS total_bets
            FROM users u
            LEFT JOIN bets b ON b.user_id = u.id
                AND (?1 IS NULL OR b.match_id IN (SELECT id FROM matches WHERE round = ?1))
            GROUP BY u.id, u.name
            ORDER BY total_points DESC, exact_scores DESC, u.name ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![round], |r| {
                Ok(RankingRow {
                    user_id: r.get(0)?,
                    name: r.get(1)?,
                    total_points: r.get(2)?,
                    exact_scores: r.get(3)?,
                    total_bets: r.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("read ranking")?;
        Ok(rows)
    }

    // ── sync bookkeeping ─────────────────────────────────────────────────────

    pub fn record_heartbeat(&mut self, hb: &HeartbeatRow) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_heartbeat(ts, matches_checked, matches_updated, bets_scored, rate_limited) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    fmt_ts(hb.ts),
                    hb.matches_checked,
                    hb.matches_updated,
                    hb.bets_scored,
                    hb.rate_limited,
                ],
            )
            .context("insert heartbeat")?;
        Ok(())
    }

    pub fn last_heartbeat(&self) -> Result<Option<HeartbeatRow>> {
        self.conn
            .query_row(
                "SELECT ts, matches_checked, matches_updated, bets_scored, rate_limited
                 FROM sync_heartbeat ORDER BY id DESC LIMIT 1",
                [],
                |r| {
                    Ok(HeartbeatRow {
                        ts: ts_col(r, 0)?,
                        matches_checked: r.get(1)?,
                        matches_updated: r.get(2)?,
                        bets_scored: r.get(3)?,
                        rate_limited: r.get(4)?,
                    })
                },
            )
            .optional()
            .context("read last heartbeat")
    }

    pub fn table_counts(&self) -> Result<Vec<(&'static str, i64)>> {
        let mut out = Vec::new();
        for t in ["users", "matches", "bets", "sync_heartbeat"] {
            let count: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(1) FROM {t}"), [], |r| r.get(0))
                .with_context(|| format!("count {t}"))?;
            out.push((t, count));
        }
        Ok(out)
    }

    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS matches (
            id INTEGER PRIMARY KEY,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            match_date TEXT NOT NULL,
            home_score INTEGER,
            away_score INTEGER,
            status TEXT NOT NULL,
            round INTEGER NOT NULL,
            season TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_matches_round ON matches(round);
        CREATE INDEX IF NOT EXISTS idx_matches_date ON matches(match_date);

        CREATE TABLE IF NOT EXISTS bets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id),
            match_id INTEGER NOT NULL REFERENCES matches(id),
            home_score_bet INTEGER NOT NULL,
            away_score_bet INTEGER NOT NULL,
            points INTEGER NOT NULL DEFAULT 0,
            is_exact INTEGER NOT NULL DEFAULT 0,
            verdict TEXT NOT NULL DEFAULT 'not_scorable',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(user_id, match_id)
        );

        CREATE INDEX IF NOT EXISTS idx_bets_match ON bets(match_id);

        CREATE TABLE IF NOT EXISTS sync_heartbeat (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ts TEXT NOT NULL,
            matches_checked INTEGER NOT NULL,
            matches_updated INTEGER NOT NULL,
            bets_scored INTEGER NOT NULL,
            rate_limited INTEGER NOT NULL
        );
        "#,
    )
    .context("init schema")?;

    Ok(())
}

// ── Shared handle ────────────────────────────────────────────────────────────

/// `Store` behind a mutex; every call runs on the blocking pool.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<Store>>,
}

impl SharedStore {
    pub fn new(store: Store) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Store) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut guard = inner.lock().map_err(|_| anyhow!("store mutex poisoned"))?;
            f(&mut guard)
        })
        .await
        .context("store task panicked")?
    }
}
